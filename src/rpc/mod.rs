//! RPC - `rpc_request` in, `rpc_response` out.

mod dispatcher;
mod params;
mod protocol;
mod queries;

pub use dispatcher::RpcDispatcher;
pub use protocol::{Dispatch, ReturnType, RpcFunction, RpcRequest, RpcResponse, RpcReturn};
