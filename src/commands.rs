use crate::config::SessionConfig;
use crate::journal::{daily_summary, Scorecard};
use crate::session::{Session, SystemClock};
use crate::ui::{self, Exit};
use anyhow::Result;
use tracing::info;

pub fn run(config: SessionConfig) -> Result<()> {
    let mut session = Session::open(config, SystemClock::new())?;
    let exit = ui::run(&mut session)?;
    let journal = session.config().journal_path.clone();
    match exit {
        Exit::Quit => {
            let card = daily_summary(&journal)?;
            info!(
                done = card.done,
                cancelled = card.cancelled,
                deferred = card.deferred,
                "daily scorecard"
            );
            print_scorecard(&session.config().journal_name(), &card);
        }
        Exit::Interrupted => println!("Interrupted. Journal left as of the last command."),
    }
    Ok(())
}

fn print_scorecard(name: &str, card: &Scorecard) {
    println!("{}", "=".repeat(35));
    println!("DAILY SCORECARD ({})", name);
    println!("  Finished  [x]: {}", card.done);
    println!("  Cancelled [-]: {}", card.cancelled);
    println!("  Deferred  [>]: {}", card.deferred);
    println!("{}", "=".repeat(35));
}
