//! lpuid - LinphoneUI bridge daemon
//!
//! ```text
//! lpuid start [-d] [--config PATH]
//! lpuid stop
//! lpuid status
//! ```

fn main() -> anyhow::Result<()> {
    lpuid::cli::run()
}
