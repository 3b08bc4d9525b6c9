/*
 * SZip Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

use crate::{APP_AUTHOR, APP_NAME, APP_VERSION};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy)]
enum Tone {
    Info,
    Dim,
    Success,
    Warn,
    Error,
}

/// Console reporter shared by the CLI and the library operations.
/// Everything goes to stderr so `info` output on stdout stays clean.
pub struct Ui {
    pub verbose: bool,
    pub very_verbose: bool,
    pub debug: bool,
    silent: bool,
    colors: bool,
    progress_bar: Arc<Mutex<Option<ProgressBar>>>,
}

impl Default for Ui {
    fn default() -> Self {
        Self::new(false, false, false, false, true)
    }
}

impl Ui {
    pub fn new(v: bool, vv: bool, d: bool, s: bool, c: bool) -> Self {
        Self {
            verbose: v,
            very_verbose: vv,
            debug: d,
            silent: s,
            colors: c,
            progress_bar: Arc::new(Mutex::new(None)),
        }
    }

    pub fn from_verbosity_level(level: u8, s: bool, c: bool) -> Self {
        Self::new(level >= 1, level >= 2, level >= 3, s, c)
    }

    /// No output except errors; used by tests and embedding callers.
    pub fn silent() -> Self {
        Self::new(false, false, false, true, false)
    }

    pub fn show_progress_bar(&self, len: u64, msg: &str) {
        if self.silent || !self.verbose {
            return;
        }
        let pb = ProgressBar::new(len);
        let tw = self.term_width();
        let msg = Self::truncate_msg(msg, tw);
        let template = if tw < 60 {
            format!("{{spinner:.green}} {} {{bar:.green/red}} {{pos}}/{{len}}", msg)
        } else {
            format!(
                "{{spinner:.green}} {} {{wide_bar:.green/red}} {{pos}}/{{len}} ({{eta}})",
                msg
            )
        };
        let style = ProgressStyle::default_bar()
            .template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .tick_strings(&["[|]", "[/]", "[-]", "[\\]"])
            .progress_chars("#>-");

        pb.set_style(style);
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        if let Ok(mut g) = self.progress_bar.lock() {
            *g = Some(pb);
        }
    }

    pub fn update_progress(&self, pos: u64) {
        if let Ok(g) = self.progress_bar.lock() {
            if let Some(ref pb) = *g {
                pb.set_position(pos);
            }
        }
    }

    pub fn finish_progress(&self) {
        if let Ok(mut g) = self.progress_bar.lock() {
            if let Some(pb) = g.take() {
                pb.finish_and_clear();
            }
        }
    }

    fn truncate_msg(msg: &str, tw: usize) -> String {
        let max_chars = if tw < 60 {
            8
        } else if tw < 80 {
            15
        } else {
            usize::MAX
        };
        if msg.chars().count() > max_chars {
            format!("{}...", msg.chars().take(max_chars).collect::<String>())
        } else {
            msg.to_string()
        }
    }

    fn paint(&self, icon: &str, msg: &str, tone: Tone) {
        let indent = " ".repeat(icon.len() + 1);
        let wrapped = self.wrap_msg(msg, indent.len());
        let color = self.supports_color();

        let icon = if color {
            match tone {
                Tone::Info => icon.blue().bold().to_string(),
                Tone::Dim => icon.dimmed().to_string(),
                Tone::Success => icon.green().bold().to_string(),
                Tone::Warn => icon.yellow().bold().to_string(),
                Tone::Error => icon.red().bold().to_string(),
            }
        } else {
            icon.to_string()
        };

        for (i, line) in wrapped.split('\n').enumerate() {
            let line = if color && matches!(tone, Tone::Dim) {
                line.dimmed().to_string()
            } else {
                line.to_string()
            };
            if i == 0 {
                eprintln!("{} {}", icon, line);
            } else {
                eprintln!("{}{}", indent, line);
            }
        }
    }

    pub fn print_banner(&self) {
        if !self.silent && self.verbose {
            self.print_rich_banner();
        }
    }

    pub fn print_rich_banner(&self) {
        let title = format!(" {} v{} ", APP_NAME, APP_VERSION);
        let border = "-".repeat(title.len());
        if self.colors {
            let tb = format!("+-{}-+", border).magenta().bold();
            eprintln!("{}\n| {} |\n{}", tb, title.cyan().bold(), tb);
        } else {
            eprintln!("+-{}-+\n| {} |\n+-{}-+", border, title, border);
        }
    }

    pub fn print_version_info(&self) {
        self.print_rich_banner();
        println!("Author:      {}", APP_AUTHOR);
        println!("License:     MIT");
        println!("Description: Signed, tamper-evident directory containers.");
    }

    fn supports_color(&self) -> bool {
        self.colors && std::env::var_os("NO_COLOR").is_none()
    }

    pub fn enable_colors_if_supported(&mut self) {
        #[cfg(windows)]
        if self.colors {
            colored::control::set_override(true);
        }
    }

    pub fn print_mode_header(&self, title: &str) {
        if self.silent || !self.verbose {
            return;
        }
        let header = format!("-- {} --", title);
        if self.colors {
            eprintln!("\n{}", header.yellow().bold());
        } else {
            eprintln!("\n{}", header);
        }
    }

    pub fn info(&self, msg: &str) {
        if self.verbose && !self.silent {
            self.paint("[i]", msg, Tone::Info);
        }
    }
    pub fn verbose(&self, msg: &str) {
        if self.verbose && !self.silent {
            self.paint("[v]", msg, Tone::Dim);
        }
    }
    pub fn very_verbose(&self, msg: &str) {
        if self.very_verbose && !self.silent {
            self.paint("[vv]", msg, Tone::Dim);
        }
    }
    pub fn debug(&self, msg: &str) {
        if self.debug && !self.silent {
            self.paint("[dbg]", msg, Tone::Dim);
        }
    }
    pub fn success(&self, msg: &str) {
        if !self.silent {
            self.paint("[+]", msg, Tone::Success);
        }
    }
    pub fn warn(&self, msg: &str) {
        if !self.silent {
            self.paint("[!]", msg, Tone::Warn);
        }
    }
    pub fn error(&self, msg: &str) {
        self.paint("[x]", msg, Tone::Error);
    }

    pub fn print_summary(&self, title: &str, fields: &[(&str, String)]) {
        if self.silent || !self.verbose {
            return;
        }
        if self.colors {
            eprintln!("{}", format!("{}:", title).green().bold());
        } else {
            eprintln!("{}:", title);
        }
        for (key, val) in fields {
            if self.colors {
                eprintln!("  {:<10} {}", key.cyan().bold(), val.green());
            } else {
                eprintln!("  {:<10} {}", key, val);
            }
        }
    }

    fn wrap_msg(&self, msg: &str, indent: usize) -> String {
        let width = self.term_width().saturating_sub(indent).max(20);
        let mut lines = Vec::new();
        let mut current = String::new();

        for word in msg.split_whitespace() {
            let needed = if current.is_empty() {
                word.chars().count()
            } else {
                current.chars().count() + 1 + word.chars().count()
            };
            if needed > width && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        if !current.is_empty() {
            lines.push(current);
        }
        lines.join("\n")
    }

    fn term_width(&self) -> usize {
        std::env::var("COLUMNS")
            .ok()
            .and_then(|s| s.parse().ok())
            .or_else(|| terminal_size::terminal_size().map(|(w, _)| w.0 as usize))
            .unwrap_or(80)
    }
}
