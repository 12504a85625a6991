use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    time::{Duration, UNIX_EPOCH},
};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, TimeDelta};
use rayon::prelude::*;

use crate::logging;

/// 單檔最大大小：10 MB
const DEFAULT_MAX_SIZE: u64 = 10 * 1024 * 1024;
/// 保留天數：7 天
const DEFAULT_MAX_AGE_DAYS: i64 = 7;

/// A dated log file that rolls over at midnight and when it grows too large.
///
/// `fn_pattern` is a chrono format string such as `log/%Y-%m-%d-app.log`.
/// Files past the size limit continue as `app.1.log`, `app.2.log`, ... so
/// nothing written earlier the same day is overwritten.
pub struct Rotate {
    fn_pattern: String,
    /// file name for the current day, without generation
    cur_base_fn: String,
    out: Option<BufWriter<File>>,
    generation: u32,
    max_size: u64,
    current_size: u64,
    max_age: TimeDelta,
}

impl Rotate {
    pub fn new(fn_pattern: String) -> Self {
        Self::with_options(fn_pattern, DEFAULT_MAX_SIZE, DEFAULT_MAX_AGE_DAYS)
    }

    pub fn with_options(fn_pattern: String, max_size: u64, max_age_days: i64) -> Self {
        Rotate {
            fn_pattern,
            cur_base_fn: String::new(),
            out: None,
            generation: 0,
            max_size,
            current_size: 0,
            max_age: TimeDelta::try_days(max_age_days).unwrap_or(TimeDelta::days(7)),
        }
    }

    /// Appends `msg` to the file for `now`, switching files first when the
    /// date changed or the size limit would be exceeded.
    pub fn write_msg(&mut self, now: DateTime<Local>, msg: &[u8]) -> Result<()> {
        let base_fn = now.format(&self.fn_pattern).to_string();

        if base_fn != self.cur_base_fn {
            self.generation = 0;
            self.cur_base_fn = base_fn;
            self.open_current()?;
            self.cleanup_old_files(now);
        } else if self.current_size + msg.len() as u64 > self.max_size {
            self.generation += 1;
            self.open_current()?;
        }

        let out = self
            .out
            .as_mut()
            .ok_or_else(|| anyhow!("log file {} is not open", self.cur_base_fn))?;
        out.write_all(msg)?;
        self.current_size += msg.len() as u64;

        Ok(())
    }

    pub fn flush(&mut self) {
        if let Some(out) = self.out.as_mut() {
            if let Err(why) = out.flush() {
                logging::error_console(format!("Failed to flush log file because {:?}", why));
            }
        }
    }

    /// generation 0: "log/2025-02-03-app.log", generation 2: "log/2025-02-03-app.2.log"
    fn file_name(base_fn: &str, generation: u32) -> PathBuf {
        if generation == 0 {
            return PathBuf::from(base_fn);
        }

        let path = Path::new(base_fn);
        let parent = path.parent().unwrap_or(Path::new(""));
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("log");
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("log");

        parent.join(format!("{}.{}.{}", stem, generation, ext))
    }

    fn open_current(&mut self) -> Result<()> {
        self.flush();

        let filename = Self::file_name(&self.cur_base_fn, self.generation);
        if let Some(parent) = filename.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&filename)?;
        self.current_size = file.metadata().map(|m| m.len()).unwrap_or(0);
        self.out = Some(BufWriter::with_capacity(4096, file));

        Ok(())
    }

    /// Deletes every `.log` file next to the current log that is older than `max_age`.
    fn cleanup_old_files(&self, now: DateTime<Local>) {
        let files = match Self::files_beside(&self.cur_base_fn) {
            Ok(files) => files,
            Err(why) => {
                logging::error_console(format!("Failed to list log directory because {:?}", why));
                return;
            }
        };

        let cut_off = Duration::from_secs((now - self.max_age).timestamp().max(0) as u64);
        let expired: Vec<PathBuf> = files
            .into_iter()
            .filter(|file| {
                fs::metadata(file)
                    .and_then(|metadata| metadata.modified())
                    .ok()
                    .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
                    .is_some_and(|modified| modified <= cut_off)
            })
            .collect();

        expired
            .par_iter()
            .with_min_len(num_cpus::get())
            .for_each(|file| {
                if let Err(why) = fs::remove_file(file) {
                    logging::error_console(format!(
                        "couldn't remove the file({}). because {:?}",
                        file.display(),
                        why
                    ));
                }
            });
    }

    fn files_beside(file_path: &str) -> Result<Vec<PathBuf>, io::Error> {
        let parent = match Path::new(file_path).parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut files = Vec::new();
        for entry in fs::read_dir(parent)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "log") {
                files.push(path);
            }
        }

        Ok(files)
    }
}

impl Drop for Rotate {
    fn drop(&mut self) {
        self.flush();
    }
}
