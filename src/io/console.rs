//! Line-oriented console feeding the command queue.
//!
//! One command per line: `<name> [parameters]`, e.g. `savemap /tmp/map.csv`.

use std::io::{self, BufRead};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::system::commands::{Command, CommandSender};

/// Forward commands read from `input` until EOF, a read error, or the
/// queue going away. Returns the number of commands forwarded.
pub fn read_commands<R: BufRead>(input: R, sender: &CommandSender) -> usize {
    let mut forwarded = 0;
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Console read error: {}", e);
                break;
            }
        };
        let Some(command) = Command::from_line(&line) else {
            continue;
        };
        debug!("Console command: {}", command);
        if !sender.send(command) {
            break;
        }
        forwarded += 1;
    }
    forwarded
}

/// Read commands from stdin on a detached background thread.
pub fn spawn_console(sender: CommandSender) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            let stdin = io::stdin();
            let n = read_commands(stdin.lock(), &sender);
            info!("Console closed after {} commands", n);
        })
        .context("failed to spawn console thread")
}
