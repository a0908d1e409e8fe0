//! LinphoneUI Daemon - bridges `linphonecsh` to the LinphoneUI front-end.
//!
//! See [`lpuid::cli`] for usage.

fn main() -> anyhow::Result<()> {
    lpuid::cli::run()
}
