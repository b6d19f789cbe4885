//! Interactive certificate prompt (spec §4.2.4)
//!
//! The terminal UI itself is an external collaborator (spec §1): this
//! module only defines the trait boundary the trust engine calls
//! through, plus a stdio-backed default implementation and a scripted
//! one for tests.

use crate::tls::cert_info::{self, ParsedCert};

/// What the interactive prompt showed the user, so a caller embedding
/// its own terminal UI has everything it needs without re-parsing the
/// certificate.
pub struct PromptContext<'a> {
    pub cert: &'a ParsedCert,
    /// 0 = leaf.
    pub depth: usize,
    pub chain_len: usize,
    /// Whether "(a)ccept always" should be offered (spec §4.2.4: "only
    /// if not expired and a trust file exists").
    pub allow_always: bool,
    /// Whether "(s)kip" should be offered (spec §4.2.4: "only if
    /// partial-chain acceptance is enabled and this is not the leaf").
    pub allow_skip: bool,
}

/// The user's answer to a certificate prompt (spec §4.2.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptChoice {
    Reject,
    AcceptOnce,
    AcceptAlways,
    Skip,
}

/// Drives the interactive certificate prompt.
pub trait CertPrompt: Send + Sync {
    fn ask(&self, ctx: &PromptContext<'_>) -> PromptChoice;
}

/// Reads a single-character answer from stdin, after printing the DN
/// parts, validity window, and fingerprints spec §4.2.4 lists.
#[derive(Debug, Default)]
pub struct StdioPrompt;

impl CertPrompt for StdioPrompt {
    fn ask(&self, ctx: &PromptContext<'_>) -> PromptChoice {
        use std::io::Write as _;

        let n = ctx.chain_len - ctx.depth;
        println!("certificate {n} of {} in chain", ctx.chain_len);
        print_dn("subject", &ctx.cert.subject);
        print_dn("issuer", &ctx.cert.issuer);
        println!("  not before: {}", ctx.cert.not_before);
        println!("  not after:  {}", ctx.cert.not_after);
        println!("  SHA-1:      {}", cert_info::sha1_fingerprint(&ctx.cert.der));
        println!("  MD5:        {}", cert_info::md5_fingerprint(&ctx.cert.der));

        loop {
            print!(
                "(r)eject, accept (o)nce{}{}? ",
                if ctx.allow_always { ", (a)ccept always" } else { "" },
                if ctx.allow_skip { ", (s)kip" } else { "" },
            );
            let _ = std::io::stdout().flush();

            let mut line = String::new();
            if std::io::stdin().read_line(&mut line).is_err() {
                return PromptChoice::Reject;
            }
            match line.trim().to_ascii_lowercase().as_str() {
                "r" => return PromptChoice::Reject,
                "o" => return PromptChoice::AcceptOnce,
                "a" if ctx.allow_always => return PromptChoice::AcceptAlways,
                "s" if ctx.allow_skip => return PromptChoice::Skip,
                _ => continue,
            }
        }
    }
}

fn print_dn(label: &str, dn: &cert_info::DnFields) {
    println!("  {label}:");
    if let Some(cn) = &dn.common_name {
        println!("    CN = {cn}");
    }
    if let Some(e) = &dn.email_address {
        println!("    emailAddress = {e}");
    }
    if let Some(o) = &dn.organization {
        println!("    O = {o}");
    }
    if let Some(ou) = &dn.organizational_unit {
        println!("    OU = {ou}");
    }
    if let Some(l) = &dn.locality {
        println!("    L = {l}");
    }
    if let Some(st) = &dn.state {
        println!("    ST = {st}");
    }
    if let Some(c) = &dn.country {
        println!("    C = {c}");
    }
}

/// A scripted prompt for tests: returns a fixed sequence of choices,
/// one per call, panicking if exhausted.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    choices: std::sync::Mutex<std::collections::VecDeque<PromptChoice>>,
}

impl ScriptedPrompt {
    #[must_use]
    pub fn new(choices: impl IntoIterator<Item = PromptChoice>) -> Self {
        Self {
            choices: std::sync::Mutex::new(choices.into_iter().collect()),
        }
    }
}

impl CertPrompt for ScriptedPrompt {
    fn ask(&self, _ctx: &PromptContext<'_>) -> PromptChoice {
        self.choices
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedPrompt exhausted: test asked for more prompts than scripted")
    }
}

/// Always rejects; the safe default for a non-interactive caller that
/// never wired in a real prompt.
#[derive(Debug, Default)]
pub struct RejectPrompt;

impl CertPrompt for RejectPrompt {
    fn ask(&self, _ctx: &PromptContext<'_>) -> PromptChoice {
        PromptChoice::Reject
    }
}
