use crate::core_transfer::listing::run_listing;
use crate::session::Session;
use log::{error, info};

/// Handles LIST and NLST once the data connection is established.
///
/// The current directory is listed; any argument is ignored. The listing is
/// sent by a transfer task which also sends the final 226 or 426.
pub async fn handle_list_command(
    session: &mut Session,
    preliminary_sent: bool,
) -> Result<(), std::io::Error> {
    let Some(stream) = session.take_data_stream() else {
        return session.reply(425, "Use PASV first").await;
    };

    let entries = match session.ctx.fs.resolve(&session.current_dir, "").await {
        Ok(dir) => session.ctx.fs.list(&dir).await,
        Err(e) => Err(e),
    };
    let entries = match entries {
        Ok(entries) => entries,
        Err(e) => {
            error!("[{}] Failed to open directory {}: {}", session.peer, session.current_dir, e);
            drop(stream);
            return session.reply(550, "Failed to open directory").await;
        }
    };

    if !preliminary_sent {
        session.reply(150, "Here comes the directory listing").await?;
    }
    info!(
        "[{}] Listing {} ({} entries)",
        session.peer,
        session.current_dir,
        entries.len()
    );
    let task = tokio::spawn(run_listing(entries, stream, session.transfer_link()));
    session.start_transfer(task);
    Ok(())
}
