//! Explain how a veto mask routes a change code.
//!
//! Codes and masks are given as flag names joined by `|` or `,`
//! (`CREATE_FEATURE|TOKEN_EVENTS`), as decimal, or as `0x` hex.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use clap::Args;

use ngbridge::notify::{delivers, NotificationDispatcher, NotifyCallback};
use ngbridge::ChangeCode;

use crate::error::CliError;

#[derive(Debug, Args)]
pub struct NotifyArgs {
    /// Veto mask of the listener (empty string accepts everything)
    #[arg(long, default_value = "TOKEN_EVENTS")]
    pub mask: String,

    /// Change code of the event
    #[arg(long)]
    pub code: String,

    /// URI carried by the event
    #[arg(long, default_value = "ngc://store/roads#1")]
    pub uri: String,
}

/// Parse a flag expression into a [`ChangeCode`].
pub fn parse_codes(input: &str) -> Result<ChangeCode, CliError> {
    let mut code = ChangeCode::empty();
    for part in input.split(['|', ',']).map(str::trim).filter(|p| !p.is_empty()) {
        let parsed = if let Some(hex) = part.strip_prefix("0x").or_else(|| part.strip_prefix("0X")) {
            u32::from_str_radix(hex, 16).ok().map(ChangeCode::from_bits_retain)
        } else if part.chars().all(|c| c.is_ascii_digit()) {
            part.parse::<u32>().ok().map(ChangeCode::from_bits_retain)
        } else {
            ChangeCode::from_name(&part.to_ascii_uppercase())
        };
        code |= parsed.ok_or_else(|| CliError::InvalidArgument(format!("unknown change code '{}'", part)))?;
    }
    Ok(code)
}

fn describe(code: ChangeCode) -> String {
    let unknown = code.bits() & !ChangeCode::all().bits();
    let unknown_text = format!("0x{:x}", unknown);
    let mut names: Vec<&str> = code.iter_names().map(|(name, _)| name).collect();
    if unknown != 0 {
        names.push(&unknown_text);
    }
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(" | ")
    }
}

pub fn run(args: NotifyArgs) -> Result<(), CliError> {
    let mask = parse_codes(&args.mask)?;
    let code = parse_codes(&args.code)?;

    println!("mask: {} (0x{:08x})", describe(mask), mask.bits());
    println!("code: {} (0x{:08x})", describe(code), code.bits());

    let dispatcher = Arc::new(NotificationDispatcher::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let listener: NotifyCallback = Arc::new(move |_: &str, _: ChangeCode| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let _guard = dispatcher.subscribe(mask, listener);
    let report = dispatcher.dispatch(&args.uri, code);

    let verdict = if delivers(mask, code) {
        "delivered"
    } else {
        let overlap = mask & code;
        println!("vetoed by: {}", describe(overlap));
        "vetoed"
    };
    println!(
        "{} -> {} (delivered {}, vetoed {}, listener called {} time(s))",
        args.uri,
        verdict,
        report.delivered,
        report.vetoed,
        calls.load(Ordering::SeqCst)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_names_and_numbers() {
        assert_eq!(
            parse_codes("CREATE_FEATURE|change_feature").unwrap(),
            ChangeCode::CREATE_FEATURE | ChangeCode::CHANGE_FEATURE
        );
        assert_eq!(parse_codes("TOKEN_EVENTS").unwrap(), ChangeCode::TOKEN_EVENTS);
        assert_eq!(parse_codes("32").unwrap(), ChangeCode::CREATE_FEATURE);
        assert_eq!(parse_codes("0x20, 0x40").unwrap().bits(), 0x60);
        assert_eq!(parse_codes("").unwrap(), ChangeCode::empty());
    }

    #[test]
    fn test_parse_rejects_unknown_names() {
        assert!(parse_codes("CREATE_FEATURES").is_err());
        assert!(parse_codes("0xZZ").is_err());
    }

    #[test]
    fn test_describe_shows_unknown_bits() {
        let code = ChangeCode::from_bits_retain(ChangeCode::CREATE_MAP.bits() | (1 << 30));
        assert_eq!(describe(code), "CREATE_MAP | 0x40000000");
        assert_eq!(describe(ChangeCode::empty()), "(none)");
    }

    proptest! {
        #[test]
        fn prop_numeric_input_keeps_every_bit(bits in any::<u32>()) {
            prop_assert_eq!(parse_codes(&bits.to_string()).unwrap().bits(), bits);
            prop_assert_eq!(parse_codes(&format!("0x{:x}", bits)).unwrap().bits(), bits);
        }
    }
}
