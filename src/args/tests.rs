use clap::Parser;
use std::time::Duration;

use super::EngineArgs;
use super::parsers::parse_duration_arg;
use super::types::{HttpMethod, PositiveU64, PositiveUsize};

#[test]
fn parse_duration_units() -> Result<(), String> {
    let cases = [
        ("500ms", Duration::from_millis(500)),
        ("2s", Duration::from_secs(2)),
        ("3m", Duration::from_secs(180)),
        ("1h", Duration::from_secs(3600)),
        ("10", Duration::from_secs(10)),
    ];
    for (input, expected) in cases {
        let parsed =
            parse_duration_arg(input).map_err(|err| format!("parse '{}' failed: {}", input, err))?;
        if parsed != expected {
            return Err(format!("'{}' parsed to {:?}", input, parsed));
        }
    }
    Ok(())
}

#[test]
fn parse_duration_rejects_invalid_values() -> Result<(), String> {
    for input in ["", "abc", "5x", "0", "0ms"] {
        if parse_duration_arg(input).is_ok() {
            return Err(format!("'{}' should not parse", input));
        }
    }
    Ok(())
}

#[test]
fn positive_newtypes_reject_zero() -> Result<(), String> {
    if PositiveU64::try_from(0).is_ok() {
        return Err("PositiveU64 accepted zero".to_owned());
    }
    if PositiveUsize::try_from(0).is_ok() {
        return Err("PositiveUsize accepted zero".to_owned());
    }
    let five = PositiveU64::try_from(5).map_err(|err| format!("5 rejected: {}", err))?;
    if five.get() != 5 {
        return Err("PositiveU64 lost its value".to_owned());
    }
    Ok(())
}

#[test]
fn cli_parses_url_shortcut() -> Result<(), String> {
    let args = EngineArgs::try_parse_from([
        "stampede",
        "-u",
        "http://localhost:8082/rest/v1/resultados",
        "--vus",
        "5",
        "-d",
        "30s",
    ])
    .map_err(|err| format!("parse failed: {}", err))?;

    if args.url.as_deref() != Some("http://localhost:8082/rest/v1/resultados") {
        return Err("Unexpected url".to_owned());
    }
    if args.vus.map(PositiveUsize::get) != Some(5) {
        return Err("Unexpected vus".to_owned());
    }
    if args.duration != Some(Duration::from_secs(30)) {
        return Err("Unexpected duration".to_owned());
    }
    if args.method != HttpMethod::Get {
        return Err("Unexpected default method".to_owned());
    }
    Ok(())
}

#[test]
fn cli_rejects_duration_with_iterations() -> Result<(), String> {
    let parsed = EngineArgs::try_parse_from([
        "stampede",
        "-u",
        "http://localhost",
        "-d",
        "10s",
        "-n",
        "100",
    ]);
    if parsed.is_ok() {
        return Err("--duration with --iterations should be rejected".to_owned());
    }
    Ok(())
}

#[test]
fn cli_parses_method_case_insensitively() -> Result<(), String> {
    let args = EngineArgs::try_parse_from(["stampede", "-u", "http://localhost", "-X", "POST"])
        .map_err(|err| format!("parse failed: {}", err))?;
    if args.method != HttpMethod::Post {
        return Err("Unexpected method".to_owned());
    }
    Ok(())
}
