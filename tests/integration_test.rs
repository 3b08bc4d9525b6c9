extern crate szip;

use std::{
    fs,
    path::{Path, PathBuf},
};
use szip::{
    cli::{build_command, run_with},
    ErrorKind, KeyChain,
};
use tempfile::tempdir;

fn fixture(name: &str) -> String {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
        .to_string_lossy()
        .into_owned()
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn run_args(args: &[&str]) -> Result<(), szip::SzipError> {
    let mut argv = vec!["szip"];
    argv.extend_from_slice(args);
    let matches = build_command().get_matches_from(argv);
    run_with(&matches)
}

fn pack_args<'a>(source: &'a str, output: &'a str, cert: &'a str, key: &'a str) -> Vec<&'a str> {
    vec!["-q", "pack", source, "-o", output, "-c", cert, "-k", key]
}

#[test]
fn test_pack_and_extract() {
    let tmp = tempdir().unwrap();
    let src = tmp.path().join("site");
    fs::create_dir_all(src.join("css")).unwrap();
    fs::write(src.join("index.html"), b"<h1>hi</h1>").unwrap();
    fs::write(src.join("css/site.css"), b"body {}").unwrap();

    let output = tmp.path().join("site");
    let (cert, key) = (fixture("signer.crt"), fixture("signer.key"));
    let (src_s, out_s) = (path_arg(&src), path_arg(&output));

    // Pack the directory
    run_args(&pack_args(&src_s, &out_s, &cert, &key)).unwrap();
    let container: PathBuf = tmp.path().join("site.szp");
    assert!(container.is_file());

    // Extract it, pinned to the signer
    let signer = KeyChain::load(
        Path::new(&cert),
        Path::new(&key),
        &szip::ui::Ui::silent(),
    )
    .unwrap();
    let dest = tmp.path().join("restored");
    let (container_s, dest_s) = (path_arg(&container), path_arg(&dest));
    let fingerprint = signer.fingerprint();
    run_args(&[
        "extract",
        container_s.as_str(),
        dest_s.as_str(),
        "--signer-hash",
        fingerprint.as_str(),
        "-q",
    ])
    .unwrap();
    assert_eq!(fs::read(dest.join("index.html")).unwrap(), b"<h1>hi</h1>");
    assert_eq!(fs::read(dest.join("css/site.css")).unwrap(), b"body {}");

    // And inspect it
    run_args(&["-q", "info", container_s.as_str()]).unwrap();
}

#[test]
fn test_existing_container_needs_overwrite() {
    let tmp = tempdir().unwrap();
    let src = tmp.path().join("src");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("a.txt"), b"a").unwrap();

    let output = tmp.path().join("box.szp");
    let (cert, key) = (fixture("signer.crt"), fixture("signer.key"));
    let (src_s, out_s) = (path_arg(&src), path_arg(&output));

    run_args(&pack_args(&src_s, &out_s, &cert, &key)).unwrap();
    let err = run_args(&pack_args(&src_s, &out_s, &cert, &key)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);

    let mut forced = pack_args(&src_s, &out_s, &cert, &key);
    forced.push("-f");
    run_args(&forced).unwrap();
}

#[test]
fn test_wrong_pin_is_rejected() {
    let tmp = tempdir().unwrap();
    let src = tmp.path().join("src");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("a.txt"), b"a").unwrap();

    let output = tmp.path().join("pinned");
    let (cert, key) = (fixture("signer.crt"), fixture("signer.key"));
    let (src_s, out_s) = (path_arg(&src), path_arg(&output));
    run_args(&pack_args(&src_s, &out_s, &cert, &key)).unwrap();

    let container = path_arg(&tmp.path().join("pinned.szp"));
    let zeros = "0".repeat(40);
    let err = run_args(&["-q", "info", container.as_str(), "--hash", zeros.as_str()]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Trust);

    let err = run_args(&["-q", "info", container.as_str(), "--hash", "not-a-hash"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn test_missing_inputs_are_config_errors() {
    let tmp = tempdir().unwrap();
    let missing = path_arg(&tmp.path().join("missing"));
    let err = run_args(&["-q", "extract", missing.as_str()]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);

    let src = tmp.path().join("src");
    fs::create_dir_all(&src).unwrap();
    let (src_s, out_s) = (path_arg(&src), path_arg(&tmp.path().join("o")));
    let no_cert = path_arg(&tmp.path().join("none.crt"));
    let key = fixture("signer.key");
    let err = run_args(&pack_args(&src_s, &out_s, &no_cert, &key)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}
