use std::{thread, time::Duration};

use chrono::{format::DelayedFormat, DateTime, Local};
use concat_string::concat_string;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use once_cell::sync::Lazy;

pub mod rotate;

use rotate::Rotate;

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("stock_sheet_sync"));

/// How long [`flush`] waits for the writer thread.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(3);

enum Command {
    Write(LogMessage),
    Flush(Sender<()>),
}

pub struct Logger {
    writer: Sender<Command>,
}

impl Logger {
    fn new(log_name: &str) -> Self {
        let (tx, rx) = unbounded::<Command>();
        let pattern = format!("log/%Y-%m-%d-{}.log", log_name);

        // 寫入檔案的操作使用另一個線程處理
        thread::spawn(move || Self::write_loop(Rotate::new(pattern), rx));

        Logger { writer: tx }
    }

    fn write_loop(mut rotate: Rotate, rx: Receiver<Command>) {
        let mut together = String::with_capacity(4096);

        for command in &rx {
            match command {
                Command::Write(received) => {
                    together.push_str(&concat_string!(
                        received.created_at.format("%F %X%.6f").to_string(),
                        " ",
                        received.level.to_string(),
                        " ",
                        received.msg,
                        "\r\n"
                    ));

                    if rx.is_empty() || together.len() >= 4096 {
                        Self::drain(&mut rotate, &mut together);
                    }
                }
                Command::Flush(done) => {
                    Self::drain(&mut rotate, &mut together);
                    rotate.flush();
                    let _ = done.send(());
                }
            }
        }
    }

    fn drain(rotate: &mut Rotate, together: &mut String) {
        if together.is_empty() {
            return;
        }

        if let Err(why) = rotate.write_msg(Local::now(), together.as_bytes()) {
            error_console(format!(
                "Failed to write to log file. because:{:?}\r\nmsg:{}",
                why, together
            ));
        }

        together.clear();
    }

    fn info(&self, log: String) {
        info_console(log.clone());
        self.send(log::Level::Info, log);
    }

    fn warn(&self, log: String) {
        warn_console(log.clone());
        self.send(log::Level::Warn, log);
    }

    fn error(&self, log: String) {
        error_console(log.clone());
        self.send(log::Level::Error, log);
    }

    fn debug(&self, log: String) {
        self.send(log::Level::Debug, log);
    }

    fn send(&self, level: log::Level, msg: String) {
        if let Err(why) = self.writer.send(Command::Write(LogMessage::new(level, msg))) {
            error_console(why.to_string());
        }
    }

    fn flush(&self) {
        let (done_tx, done_rx) = bounded::<()>(1);
        if self.writer.send(Command::Flush(done_tx)).is_err() {
            return;
        }

        if done_rx.recv_timeout(FLUSH_TIMEOUT).is_err() {
            error_console("Timed out waiting for the log writer to flush".to_string());
        }
    }
}

pub struct LogMessage {
    pub level: log::Level,
    pub msg: String,
    pub created_at: DateTime<Local>,
}

impl LogMessage {
    pub fn new(level: log::Level, msg: String) -> Self {
        LogMessage {
            level,
            msg,
            created_at: Local::now(),
        }
    }
}

pub fn info_file_async(log: String) {
    LOGGER.info(log);
}

pub fn warn_file_async(log: String) {
    LOGGER.warn(log);
}

pub fn error_file_async(log: String) {
    LOGGER.error(log);
}

pub fn debug_file_async(log: String) {
    LOGGER.debug(log);
}

/// Blocks until everything logged so far is on disk.
///
/// The writer is a detached thread, so a one-shot process has to call this
/// before returning from `main` or the tail of the log is lost.
pub fn flush() {
    LOGGER.flush();
}

pub fn info_console(log: String) {
    println!(
        "{} Info {}",
        Local::now().format("%Y-%m-%d %H:%M:%S.%3f"),
        log
    );
}

pub fn warn_console(log: String) {
    println!(
        "{} Warn {}",
        Local::now().format("%Y-%m-%d %H:%M:%S.%3f"),
        log
    );
}

pub fn error_console(log: String) {
    eprintln!(
        "{} Error {}",
        DelayedFormat::to_string(&Local::now().format("%Y-%m-%d %H:%M:%S.%3f")),
        log
    );
}
