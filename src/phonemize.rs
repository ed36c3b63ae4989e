//! Text to IPA phonemes through the `espeak-ng` command-line tool.
//!
//! Output matches `espeak-ng --ipa -q -v en-us`: one line per clause, which
//! is joined with spaces.  The binary must be on `PATH`; see
//! [`is_espeak_available`].

use std::{
    io::Write,
    process::{Command, Stdio},
};

use anyhow::{bail, Context, Result};
use once_cell::sync::OnceCell;

const ESPEAK: &str = "espeak-ng";
const VOICE: &str = "en-us";

static AVAILABLE: OnceCell<bool> = OnceCell::new();

/// Whether `espeak-ng` can be spawned.  Probed once per process.
pub fn is_espeak_available() -> bool {
    *AVAILABLE.get_or_init(|| {
        Command::new(ESPEAK)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    })
}

/// Convert `text` to IPA with the `en-us` voice.
pub fn phonemize(text: &str) -> Result<String> {
    if text.trim().is_empty() {
        return Ok(String::new());
    }

    let mut child = Command::new(ESPEAK)
        .args(["--ipa", "-q", "-b", "1", "-v", VOICE, "--stdin"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to spawn {ESPEAK}; is it installed?"))?;

    {
        let mut stdin = child.stdin.take().context("espeak-ng stdin unavailable")?;
        stdin.write_all(text.as_bytes()).context("Failed to write to espeak-ng")?;
    }

    let output = child.wait_with_output().context("espeak-ng did not finish")?;
    if !output.status.success() {
        bail!(
            "espeak-ng exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let stdout = String::from_utf8(output.stdout).context("espeak-ng returned non-UTF-8 phonemes")?;
    Ok(join_clauses(&stdout))
}

fn join_clauses(raw: &str) -> String {
    raw.lines().map(str::trim).filter(|l| !l.is_empty()).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_clauses() {
        assert_eq!(join_clauses(" həlˈoʊ\n\nwˈɜːld \n"), "həlˈoʊ wˈɜːld");
        assert_eq!(join_clauses(""), "");
    }

    #[test]
    fn test_empty_input_skips_subprocess() {
        assert_eq!(phonemize("   ").unwrap(), "");
    }

    #[test]
    fn test_phonemize_hello() {
        if !is_espeak_available() {
            eprintln!("espeak-ng not installed; skipping");
            return;
        }
        let ipa = phonemize("Hello world").unwrap();
        assert!(!ipa.is_empty());
        assert!(!ipa.contains('\n'));
    }
}
