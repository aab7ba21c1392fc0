//! Command handlers module.
//!
//! One handler per FTP command. Handlers work on the control session and
//! produce the reply to send; the transfer commands also move data over the
//! negotiated data connection and report progress on the control connection
//! while doing so.

use std::time::Duration;

use log::{info, warn};
use tokio::time::sleep;

use crate::client::{FtpSession, RenameSource};
use crate::error::handlers::{negotiation_error_reply, storage_error_reply, transfer_error_reply};
use crate::error::{StorageError, TransferError};
use crate::navigate::change_directory;
use crate::net::{Connection, Stream};
use crate::protocol::responses::*;
use crate::protocol::{Command, CommandResult};
use crate::transfer::{receive_file, send_file, send_listing};

/// Pause before answering a failed login.
const LOGIN_DENIED_DELAY: Duration = Duration::from_millis(100);

/// Handlers bail out early with the failure reply as the error.
type Reply = Result<CommandResult, CommandResult>;

/// Dispatches a received FTP command to its corresponding handler.
///
/// After a transfer command the data channel is discarded, whatever the
/// outcome, so every transfer needs its own PORT or PASV.
pub async fn handle_command<S: Stream>(
    session: &mut FtpSession<S>,
    command: &Command,
) -> CommandResult {
    let reply = match command {
        Command::QUIT => Ok(CommandResult::close(CLOSING)),
        Command::OPTS(args) => handle_cmd_opts(args),
        Command::USER(username) => handle_cmd_user(session, username),
        Command::PASS(password) => handle_cmd_pass(session, password).await,
        Command::PWD => handle_cmd_pwd(session).await,
        Command::TYPE | Command::NOOP => Ok(CommandResult::success(OK)),
        Command::SYST => Ok(CommandResult::success(SYSTEM_TYPE)),
        Command::FEAT => Ok(CommandResult::success(FEATURES)),
        Command::PORT(arg) => handle_cmd_port(session, arg, false).await,
        Command::EPRT(arg) => handle_cmd_port(session, arg, true).await,
        Command::PASV => handle_cmd_pasv(session, false),
        Command::EPSV => handle_cmd_pasv(session, true),
        Command::LIST(directory) => handle_cmd_list(session, directory.as_deref()).await,
        Command::SIZE(name) => handle_cmd_size(session, name).await,
        Command::MKD(name) => handle_cmd_mkd(session, name).await,
        Command::RMD(name) => handle_cmd_rmd(session, name).await,
        Command::CWD(name) => handle_cmd_cwd(session, name).await,
        Command::RNFR(name) => handle_cmd_rnfr(session, name).await,
        Command::RNTO(name) => handle_cmd_rnto(session, name).await,
        Command::RETR(name) => handle_cmd_retr(session, name).await,
        Command::STOR(name) => handle_cmd_stor(session, name).await,
        Command::UNKNOWN(verb) => Ok(CommandResult::failure(not_implemented(verb))),
    };

    if command.uses_data_connection() {
        session.negotiator.discard();
    }

    match reply {
        Ok(result) | Err(result) => result,
    }
}

// --- Guards ---

/// Home directory of the logged in user.
fn logged_in_home<S: Stream>(session: &FtpSession<S>) -> Result<String, CommandResult> {
    session
        .client
        .home_directory()
        .map(str::to_string)
        .ok_or_else(|| CommandResult::failure(NOT_LOGGED_IN))
}

async fn mounted<S: Stream>(session: &FtpSession<S>) -> Result<(), CommandResult> {
    if session.fs.is_mounted().await {
        Ok(())
    } else {
        Err(storage_failure(StorageError::NotMounted))
    }
}

/// Both guards of the file system commands.
async fn ready<S: Stream>(session: &FtpSession<S>) -> Result<String, CommandResult> {
    let home = logged_in_home(session)?;
    mounted(session).await?;
    Ok(home)
}

/// Full path of `name` relative to the working directory.
fn resolve<S: Stream>(
    session: &FtpSession<S>,
    name: &str,
    what: &str,
) -> Result<String, CommandResult> {
    session
        .fs
        .make_full_path(name, session.client.working_directory())
        .ok_or_else(|| invalid(what))
}

fn invalid(what: &str) -> CommandResult {
    storage_failure(StorageError::InvalidPath(what.to_string()))
}

fn storage_failure(err: StorageError) -> CommandResult {
    CommandResult::failure(storage_error_reply(&err))
}

// --- Session commands ---

fn handle_cmd_opts(args: &str) -> Reply {
    let args: Vec<&str> = args.split_whitespace().collect();
    if args == ["UTF8", "ON"] {
        Ok(CommandResult::success(UTF8_ENABLED))
    } else {
        Err(CommandResult::failure(OPTS_NOT_SUPPORTED))
    }
}

fn handle_cmd_user<S: Stream>(session: &mut FtpSession<S>, username: &str) -> Reply {
    session.client.set_username(username);
    Ok(CommandResult::success(ENTER_PASSWORD))
}

async fn handle_cmd_pass<S: Stream>(session: &mut FtpSession<S>, password: &str) -> Reply {
    let username = session.client.username().unwrap_or_default().to_string();

    let Some(home) = session.auth.home_directory(&username, password) else {
        warn!("login denied for {}", username);
        sleep(LOGIN_DENIED_DELAY).await;
        return Err(CommandResult::failure(LOGIN_DENIED));
    };

    let home = session
        .fs
        .make_full_path(&home, "/")
        .ok_or_else(|| CommandResult::failure(INVALID_HOME))?;
    if !session.fs.is_directory(&home).await {
        warn!("home directory {} of {} does not exist", home, username);
        return Err(CommandResult::failure(INVALID_HOME));
    }

    info!("{} logged in", username);
    let reply = logged_on(&home);
    session.client.login(home);
    Ok(CommandResult::success(reply))
}

// --- Navigation ---

async fn handle_cmd_pwd<S: Stream>(session: &FtpSession<S>) -> Reply {
    ready(session).await?;
    Ok(CommandResult::success(working_directory(
        session.client.working_directory(),
    )))
}

async fn handle_cmd_cwd<S: Stream>(session: &mut FtpSession<S>, name: &str) -> Reply {
    let home = ready(session).await?;
    let path = change_directory(&session.fs, &mut session.client, &home, name)
        .await
        .map_err(storage_failure)?;
    Ok(CommandResult::success(directory_changed(&path)))
}

// --- Data channel negotiation ---

async fn handle_cmd_port<S: Stream>(session: &mut FtpSession<S>, arg: &str, extended: bool) -> Reply {
    session.negotiator.discard();
    logged_in_home(session)?;

    let negotiated = if extended {
        session.negotiator.eprt(arg).await
    } else {
        session.negotiator.port(arg).await
    };
    match negotiated {
        Ok(()) => Ok(CommandResult::success(PORT_OK)),
        Err(e) => {
            warn!("active mode for {} failed: {}", session.control.peer_ip(), e);
            Err(CommandResult::failure(negotiation_error_reply(&e)))
        }
    }
}

fn handle_cmd_pasv<S: Stream>(session: &mut FtpSession<S>, extended: bool) -> Reply {
    session.negotiator.discard();
    logged_in_home(session)?;

    let negotiated = if extended {
        session.negotiator.epsv()
    } else {
        session.negotiator.pasv(session.control.local_ip())
    };
    negotiated
        .map(CommandResult::success)
        .map_err(|e| CommandResult::failure(negotiation_error_reply(&e)))
}

// --- Transfers ---

/// Takes the data connection and announces the transfer.
async fn open_data_connection<S: Stream>(session: &mut FtpSession<S>) -> Result<Connection, CommandResult> {
    let data = session
        .negotiator
        .take_data_connection()
        .await
        .map_err(|e| CommandResult::failure(negotiation_error_reply(&e)))?;
    if session.control.send_string(TRANSFER_STARTING).await.is_err() {
        return Err(CommandResult::abort());
    }
    Ok(data)
}

/// Closes the data connection before the final reply goes out.
fn finish_transfer<T>(mut data: Connection, result: Result<T, TransferError>) -> Reply {
    data.close();
    match result {
        Ok(_) => Ok(CommandResult::success(TRANSFER_COMPLETE)),
        Err(e) => {
            warn!("data transfer with {} failed: {}", data.peer_ip(), e);
            Err(CommandResult::failure(transfer_error_reply(&e)))
        }
    }
}

async fn handle_cmd_list<S: Stream>(session: &mut FtpSession<S>, directory: Option<&str>) -> Reply {
    let home = ready(session).await?;
    let full_path = match directory {
        Some(directory) => resolve(session, directory, "directory name")?,
        None => session.client.working_directory().to_string(),
    };
    if !session.fs.is_directory(&full_path).await {
        return Err(invalid("directory name"));
    }
    if !session.fs.user_has_right_to_access_directory(&full_path, &home) {
        return Err(storage_failure(StorageError::AccessDenied(full_path)));
    }

    let mut data = open_data_connection(session).await?;
    let result = send_listing(&mut data, &session.fs, &full_path).await;
    finish_transfer(data, result)
}

/// Validation shared by RETR and STOR.
async fn transfer_path<S: Stream>(session: &FtpSession<S>, name: &str) -> Result<String, CommandResult> {
    let home = ready(session).await?;
    let full_path = resolve(session, name, "file name")?;
    if session.fs.is_directory(&full_path).await {
        return Err(invalid("file name"));
    }
    if !session.fs.user_has_right_to_access_file(&full_path, &home) {
        return Err(storage_failure(StorageError::AccessDenied(full_path)));
    }
    Ok(full_path)
}

async fn handle_cmd_retr<S: Stream>(session: &mut FtpSession<S>, name: &str) -> Reply {
    let full_path = transfer_path(session, name).await?;
    let mut data = open_data_connection(session).await?;
    let result = send_file(&mut data, &session.fs, &full_path).await;
    finish_transfer(data, result)
}

async fn handle_cmd_stor<S: Stream>(session: &mut FtpSession<S>, name: &str) -> Reply {
    let full_path = transfer_path(session, name).await?;
    let mut data = open_data_connection(session).await?;
    let result = receive_file(&mut data, &session.fs, &full_path).await;
    finish_transfer(data, result)
}

// --- File system commands ---

async fn handle_cmd_size<S: Stream>(session: &FtpSession<S>, name: &str) -> Reply {
    let home = ready(session).await?;
    let full_path = resolve(session, name, "file name")?;
    if !session.fs.user_has_right_to_access_file(&full_path, &home) {
        return Err(storage_failure(StorageError::AccessDenied(full_path)));
    }
    // a missing file reports size 0
    let size = session.fs.file_size(&full_path).await.unwrap_or(0);
    Ok(CommandResult::success(file_size(size)))
}

async fn handle_cmd_mkd<S: Stream>(session: &FtpSession<S>, name: &str) -> Reply {
    let home = ready(session).await?;
    let full_path = resolve(session, name, "directory name")?;
    if !session.fs.user_has_right_to_access_directory(&full_path, &home) {
        return Err(storage_failure(StorageError::AccessDenied(full_path)));
    }
    match session.fs.make_directory(&full_path).await {
        Ok(()) => Ok(CommandResult::success(DIRECTORY_CREATED)),
        Err(_) => Err(CommandResult::failure(CANNOT_CREATE_DIRECTORY)),
    }
}

/// RMD and DELE: removes a file or an empty directory.
async fn handle_cmd_rmd<S: Stream>(session: &FtpSession<S>, name: &str) -> Reply {
    let home = ready(session).await?;
    let full_path = resolve(session, name, "file or directory name")?;
    if !session.fs.user_has_right_to_access_directory(&full_path, &home) {
        return Err(storage_failure(StorageError::AccessDenied(full_path)));
    }

    if session.fs.is_file(&full_path).await {
        return match session.fs.remove_file(&full_path).await {
            Ok(()) => Ok(CommandResult::success(FILE_DELETED)),
            Err(_) => Err(CommandResult::failure(CANNOT_DELETE_FILE)),
        };
    }
    if full_path == home {
        return Err(CommandResult::failure(CANNOT_REMOVE_HOME));
    }
    if full_path == session.client.working_directory() {
        return Err(CommandResult::failure(CANNOT_REMOVE_WORKING));
    }
    match session.fs.remove_directory(&full_path).await {
        Ok(()) => Ok(CommandResult::success(DIRECTORY_REMOVED)),
        Err(_) => Err(CommandResult::failure(CANNOT_REMOVE_DIRECTORY)),
    }
}

async fn handle_cmd_rnfr<S: Stream>(session: &mut FtpSession<S>, name: &str) -> Reply {
    session.client.set_rename_from(None);
    let home = ready(session).await?;
    let full_path = resolve(session, name, "file or directory name")?;

    let source = if session.fs.is_directory(&full_path).await {
        if !session.fs.user_has_right_to_access_directory(&full_path, &home) {
            return Err(storage_failure(StorageError::AccessDenied(full_path)));
        }
        RenameSource::Directory(full_path)
    } else if session.fs.is_file(&full_path).await {
        if !session.fs.user_has_right_to_access_file(&full_path, &home) {
            return Err(storage_failure(StorageError::AccessDenied(full_path)));
        }
        RenameSource::File(full_path)
    } else {
        return Err(invalid("file or directory name"));
    };

    session.client.set_rename_from(Some(source));
    Ok(CommandResult::success(NEED_MORE_INFORMATION))
}

async fn handle_cmd_rnto<S: Stream>(session: &mut FtpSession<S>, name: &str) -> Reply {
    let home = ready(session).await?;
    let full_path = resolve(session, name, "file or directory name")?;

    let from = match session.client.take_rename_from() {
        Some(RenameSource::Directory(from)) => {
            if !session.fs.user_has_right_to_access_directory(&full_path, &home) {
                return Err(storage_failure(StorageError::AccessDenied(full_path)));
            }
            from
        }
        Some(RenameSource::File(from)) => {
            if !session.fs.user_has_right_to_access_file(&full_path, &home) {
                return Err(storage_failure(StorageError::AccessDenied(full_path)));
            }
            from
        }
        None => return Err(invalid("file or directory name")),
    };

    match session.fs.rename(&from, &full_path).await {
        Ok(()) => Ok(CommandResult::success(RENAMED)),
        Err(_) => Err(CommandResult::failure(CANNOT_RENAME)),
    }
}
