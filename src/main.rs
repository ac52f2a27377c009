use chrono::Local;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    select, signal,
};

use updot::{Config, Error, HttpProbe, Monitor, MonitorState};

#[tokio::main]
async fn main() {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    if let Err(e) = run().await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Error> {
    let config = Config::load()?;
    let target = config.target()?;
    let site = target.site_name();

    info!("Monitoring {} ({} mode)", target.primary(), target.mode());
    if let Some(alternate) = target.alternate() {
        info!("Alternate host on DNS failure: {alternate}");
    }
    info!("Press Enter to check now, q to quit");

    let monitor = Arc::new(Monitor::new(target, HttpProbe::new()?));
    let mut updates = monitor.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    println!("{}", render(&site, &monitor.state()));
    monitor.start();

    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *updates.borrow_and_update();
                println!("{}", render(&site, &state));
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().eq_ignore_ascii_case("q") => {
                    info!("Quit requested");
                    break;
                }
                Ok(Some(_)) => {
                    let monitor = Arc::clone(&monitor);
                    tokio::spawn(async move { monitor.check_now().await });
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("Stopped reading stdin: {e}");
                    stdin_open = false;
                }
            },
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!("Failed to listen for Ctrl-C: {e}");
                }
                info!("Shutdown requested");
                break;
            }
        }
    }

    monitor.stop();
    Ok(())
}

fn render(site: &str, state: &MonitorState) -> String {
    match state.last_checked {
        Some(at) => format!(
            "{} - {site} (last checked {})",
            state.status,
            at.with_timezone(&Local).format("%H:%M:%S")
        ),
        None => format!("{} - {site}", state.status),
    }
}
