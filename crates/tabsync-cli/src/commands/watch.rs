//! Watch command.

use anyhow::{bail, Result};
use clap::Args;
use tokio::sync::mpsc;
use tracing::info;

use tabsync_core::TabSyncConfig;
use tabsync_host::{Browser, NotificationSink};

use crate::output;

#[derive(Args)]
pub struct WatchArgs {
    /// Number of tabs to open
    #[arg(long, default_value = "2")]
    pub tabs: usize,

    /// Open tabs without a relay channel, so followers see nothing
    #[arg(long)]
    pub no_relay: bool,
}

pub async fn execute(args: WatchArgs, config: TabSyncConfig, verbose: bool) -> Result<()> {
    if args.tabs == 0 {
        bail!("--tabs must be at least 1");
    }

    let mut browser = Browser::new(config)?;
    if args.no_relay {
        browser = browser.without_channel();
    }
    output::print_banner(browser.config(), args.tabs, !args.no_relay);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut tabs = Vec::with_capacity(args.tabs);
    for n in 1..=args.tabs {
        let tab_id = format!("tab-{n}");
        let sink = NotificationSink::new(tab_id.clone(), tx.clone());
        tabs.push(browser.open_tab(tab_id, sink)?);
    }
    drop(tx);
    info!(tabs = tabs.len(), url = %browser.config().stream.url, "Tabs opened");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result?;
                break;
            }
            note = rx.recv() => match note {
                Some(note) => output::print_notification(&note, verbose),
                None => break,
            },
        }
    }

    output::print_closing(tabs.len());
    for tab in tabs {
        tab.shutdown().await;
    }
    Ok(())
}
