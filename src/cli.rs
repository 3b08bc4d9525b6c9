/*
 * SZip Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

use crate::{
    config::{Config, Mode},
    error::SzipError,
    keys::KeyChain,
    ui::Ui,
    *,
};
use clap::{Arg, ArgAction, ArgMatches, Command};

/// Fingerprint options shared by the subcommands that read a container.
fn pin_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("hash")
            .long("hash")
            .value_name("SHA1")
            .conflicts_with("signer_hash")
            .help("Expected SHA-1 of the container envelope"),
    )
    .arg(
        Arg::new("signer_hash")
            .long("signer-hash")
            .value_name("SHA1")
            .help("Expected SHA-1 of the signer certificate"),
    )
}

pub fn build_command() -> Command {
    let binary_name = std::env::args()
        .next()
        .and_then(|p| {
            std::path::Path::new(&p)
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| APP_BIN_NAME.to_string());

    Command::new(APP_NAME)
        .bin_name(binary_name)
        .version(APP_VERSION)
        .author(APP_AUTHOR)
        .about(APP_ABOUT)
        .disable_version_flag(true)
        .help_template("{about-with-newline}{usage-heading} {usage}\n\n{all-args}\n")
        .subcommand_required(false)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("pack")
                .about("Pack a directory into a signed container")
                .arg_required_else_help(true)
                .arg(
                    Arg::new("source")
                        .required(true)
                        .help("Directory to pack")
                        .index(1),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("Container name; .szp is appended when missing"),
                )
                .arg(
                    Arg::new("cert")
                        .short('c')
                        .long("cert")
                        .help("Signer certificate (PEM/DER), default ./my.crt"),
                )
                .arg(
                    Arg::new("private_key")
                        .short('k')
                        .long("private-key")
                        .help("Signer private key (PEM/PK8), default ./my.key"),
                )
                .arg(
                    Arg::new("overwrite")
                        .short('f')
                        .long("overwrite")
                        .action(ArgAction::SetTrue)
                        .help("Force overwrite if the container exists"),
                ),
        )
        .subcommand(pin_args(
            Command::new("extract")
                .about("Verify a container and extract its files")
                .arg_required_else_help(true)
                .arg(
                    Arg::new("container")
                        .required(true)
                        .help("Container to extract")
                        .index(1),
                )
                .arg(
                    Arg::new("destination")
                        .help("Destination directory (default: container name)")
                        .index(2),
                ),
        ))
        .subcommand(pin_args(
            Command::new("info")
                .about("Verify a container and print its manifest")
                .arg_required_else_help(true)
                .arg(
                    Arg::new("container")
                        .required(true)
                        .help("Container to inspect")
                        .index(1),
                ),
        ))
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::Count)
                .help("Set verbosity level (-v for verbose, -vv for more verbose, -vvv for debug)"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Suppress all output except errors"),
        )
        .arg(
            Arg::new("version_custom")
                .short('V')
                .long("version")
                .action(ArgAction::SetTrue)
                .help("Print version information"),
        )
}

pub fn run() -> Result<(), SzipError> {
    let matches = build_command().get_matches();
    run_with(&matches)
}

/// Runs already-parsed arguments; the binary and the tests both land here.
pub fn run_with(matches: &ArgMatches) -> Result<(), SzipError> {
    if matches.get_flag("version_custom") {
        let mut ui = Ui::new(false, false, false, false, true);
        ui.enable_colors_if_supported();
        ui.print_version_info();
        return Ok(());
    }

    let verbosity_level = matches.get_count("verbose");
    let quiet = matches.get_flag("quiet");
    let mut ui = Ui::from_verbosity_level(verbosity_level, quiet, true);
    ui.enable_colors_if_supported();
    ui.print_banner();

    if matches.subcommand().is_none() {
        return Err(SzipError::Config("No command provided".into()));
    }

    run_logic(matches, &ui)
}

fn run_logic(matches: &ArgMatches, ui: &Ui) -> Result<(), SzipError> {
    let config = Config::from_matches(matches, ui)?;
    ui.debug(&format!("{:?}", config));

    match config.mode {
        Mode::Pack { ref source } => {
            ui.print_mode_header("PACK MODE");
            ui.info(&format!("Source: {}", source.display()));
            ui.info(&format!("Target: {}", config.container_path.display()));

            if config.container_path.exists() && !config.overwrite {
                return Err(SzipError::Config(format!(
                    "Output exists: {}. Use --overwrite.",
                    config.container_path.display()
                )));
            }

            ui.info("Loading keys...");
            ui.verbose(&format!("Certificate: {}", config.cert_path.display()));
            ui.verbose(&format!("Private key: {}", config.key_path.display()));
            let key_chain = KeyChain::load(&config.cert_path, &config.key_path, ui)?;

            ui.info("Packing...");
            let written = pack(source, &config.container_path, &key_chain, ui)?;
            let fingerprint = crypto::CryptoEngine::compute_sha1(&container_der(&written)?);
            ui.success("Container packed and signed.");

            if ui.verbose {
                eprintln!();
            }
            ui.print_summary(
                "Pack Report",
                &[
                    ("Source", source.display().to_string()),
                    ("Output", written.display().to_string()),
                    ("Signer", key_chain.subject()),
                    ("SHA-1", fingerprint),
                ],
            );
        }
        Mode::Extract { ref destination } => {
            ui.print_mode_header("EXTRACT MODE");
            ui.info(&format!("Container: {}", config.container_path.display()));
            ui.info(&format!("Destination: {}", destination.display()));

            let summary = extract(
                &config.container_path,
                destination,
                config.pin.as_ref(),
                ui,
            )?;
            ui.success("Signature valid. Container extracted.");

            if ui.verbose {
                eprintln!();
            }
            ui.print_summary(
                "Extract Report",
                &[
                    ("Signer", summary.signer),
                    ("Files", summary.files.to_string()),
                    ("Dirs", summary.directories.to_string()),
                    ("Bytes", summary.bytes.to_string()),
                ],
            );
        }
        Mode::Info => {
            ui.print_mode_header("INFO MODE");
            let manifest = info(&config.container_path, config.pin.as_ref(), ui)?;
            println!("{}", manifest);
            ui.success("Signature valid.");
        }
    }

    Ok(())
}

/// DER body of a freshly written container, for the pack report fingerprint.
fn container_der(path: &std::path::Path) -> Result<Vec<u8>, SzipError> {
    let raw = std::fs::read(path).map_err(|e| SzipError::io_at(path, e))?;
    Ok(::pem::parse(raw)?.into_contents())
}
