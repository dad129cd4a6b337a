//! Promise detection for JavaScript/TypeScript.
//!
//! Binary crate entry point. All CLI logic is in the `cli` module.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod cli;
mod server;

fn main() {
    cli::run();
}
