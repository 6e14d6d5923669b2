//! A ticker daemon.
//!
//!   cargo run --example tick_daemon -- start
//!   cargo run --example tick_daemon -- restart
//!   cargo run --example tick_daemon -- stop

use daemon_keeper::{DaemonResult, Daemonizer, StopOutcome};
use std::env;
use std::thread;
use std::time::Duration;

const PID_FILE: &str = "ticker.pid";
const LOG_FILE: &str = "ticker.log";

fn start() -> DaemonResult<()> {
    println!("Launching a simple ticker daemon...");
    println!("Logs will be written to: {LOG_FILE}");

    Daemonizer::new()
        .pid_file(PID_FILE)
        .log_file(LOG_FILE)
        .exit_on_signal(false)
        .run(|daemon| {
            // println! now writes to ticker.log.
            println!("[ticker] started, pid {}", daemon.pid());

            let mut i = 0u64;
            while !daemon.shutdown_requested() {
                if daemon.take_reload_request() {
                    println!("[ticker] reload requested, resetting counter");
                    i = 0;
                }
                println!("[ticker] ping #{i}");
                i += 1;
                thread::sleep(Duration::from_millis(500));
            }

            println!("[ticker] stop requested, shutting down cleanly");
            Ok(())
        })
}

fn main() -> DaemonResult<()> {
    match env::args().nth(1).as_deref() {
        Some("start") | None => start(),
        Some("restart") => {
            if !daemon_keeper::restart(PID_FILE)? {
                eprintln!("ticker is not running");
            }
            Ok(())
        }
        Some("stop") => {
            match daemon_keeper::kill(PID_FILE, Duration::from_secs(5))? {
                StopOutcome::NotRunning => eprintln!("ticker is not running"),
                StopOutcome::Stopped => eprintln!("ticker stopped"),
                StopOutcome::Killed => eprintln!("ticker did not stop in time and was killed"),
            }
            Ok(())
        }
        Some(other) => {
            eprintln!("unknown command '{other}', expected start, restart or stop");
            std::process::exit(2);
        }
    }
}
