//! lpui - control client for the LinphoneUI bridge daemon

fn main() -> anyhow::Result<()> {
    lpui_ctl::cli::run()
}
