//! Display version information.

pub fn execute() {
    println!("holdout {}", env!("CARGO_PKG_VERSION"));
}
