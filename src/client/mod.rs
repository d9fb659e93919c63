/// RPC client: sends commands and awaits correlated replies.
mod gate;
mod rpc_client;

pub(crate) use gate::CorrelationGate;
pub use rpc_client::RpcClient;
