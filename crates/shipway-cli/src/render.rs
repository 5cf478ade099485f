use std::io::{self, BufRead, Write};
use std::time::Duration;

use anstyle::{AnsiColor, Effects, Style};
use indicatif::ProgressBar;

use shipway_deploy::{Console, FileSync, ListEntry, RsyncSync, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStyle {
    Plain,
    Rich,
}

/// `--plain` always wins; otherwise styling follows whether stdout is a
/// terminal.
pub fn resolve_output_style(plain_flag: bool, stdout_is_tty: bool) -> OutputStyle {
    if plain_flag || !stdout_is_tty {
        OutputStyle::Plain
    } else {
        OutputStyle::Rich
    }
}

fn large_marker_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::Red.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

/// The interactive console: plain lines on stdout, prompts answered on
/// stdin. Prompt defaults and re-asking live here; what gets asked lives in
/// the check flows.
pub struct TerminalConsole {
    style: OutputStyle,
}

impl TerminalConsole {
    pub fn new(style: OutputStyle) -> Self {
        Self { style }
    }

    fn marker(&self) -> String {
        match self.style {
            OutputStyle::Plain => "[Large]".to_string(),
            OutputStyle::Rich => colorize(large_marker_style(), "[Large]"),
        }
    }
}

impl Console for TerminalConsole {
    fn say(&self, line: &str) {
        println!("{line}");
    }

    fn list(&self, heading: &str, entries: &[ListEntry]) {
        println!("{heading}");
        for entry in entries {
            if entry.large {
                println!("{} {}", entry.name, self.marker());
            } else {
                println!("{}", entry.name);
            }
        }
    }

    fn choose(&self, prompt: &str, default: Option<char>, choices: &[char]) -> char {
        loop {
            print!("{prompt}");
            let _ = io::stdout().flush();

            let mut line = String::new();
            match io::stdin().lock().read_line(&mut line) {
                // EOF or unreadable stdin cannot re-ask; fall back to the
                // default, or to the refusing choice for defaultless prompts.
                Ok(0) | Err(_) => return default.unwrap_or('n'),
                Ok(_) => {}
            }

            match line.trim().chars().next().map(|ch| ch.to_ascii_lowercase()) {
                None => {
                    if let Some(default) = default {
                        return default;
                    }
                }
                Some(answer) if choices.contains(&answer) => return answer,
                Some(_) => {}
            }
        }
    }
}

/// Rsync with a terminal spinner over the dry run. The upload needs no
/// decoration: rsync's own progress meter streams to the terminal.
pub struct SpinnerSync {
    inner: RsyncSync,
    style: OutputStyle,
}

impl SpinnerSync {
    pub fn new(inner: RsyncSync, style: OutputStyle) -> Self {
        Self { inner, style }
    }
}

impl FileSync for SpinnerSync {
    fn preview(&self, host: &str, last_dir: &str) -> Result<String, SyncError> {
        let spinner = match self.style {
            OutputStyle::Plain => None,
            OutputStyle::Rich => {
                let bar = ProgressBar::new_spinner();
                bar.set_message(format!("comparing working tree with {host}"));
                bar.enable_steady_tick(Duration::from_millis(80));
                Some(bar)
            }
        };
        let listing = self.inner.preview(host, last_dir);
        if let Some(bar) = spinner {
            bar.finish_and_clear();
        }
        listing
    }

    fn upload(&self, host: &str, target_dir: &str, last_dir: Option<&str>) -> Result<(), SyncError> {
        self.inner.upload(host, target_dir, last_dir)
    }
}
