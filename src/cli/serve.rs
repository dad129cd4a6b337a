//! JSON-RPC service startup.

use tracing::info;

use promise_lens::PromiseError;

use crate::server::{self, ServerContext};

use super::args::ServeArgs;

pub fn cmd_serve(args: ServeArgs) -> Result<(), PromiseError> {
    info!(mode = %args.mode, color = %args.color, "Starting JSON-RPC server");

    let ctx = ServerContext {
        default_mode: args.mode,
        color: args.color,
    };
    server::run_server(&ctx);
    Ok(())
}
