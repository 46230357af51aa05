use tonic::transport::Channel;

use crate::dispatch::job::JobSpec;
use crate::error::{ForemanError, Result};
use crate::proto::worker_service_client::WorkerServiceClient;
use crate::proto::ShutdownRequest;

fn endpoint_url(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

async fn connect(address: &str) -> Result<WorkerServiceClient<Channel>> {
    let channel = Channel::from_shared(endpoint_url(address))
        .map_err(|_| ForemanError::InvalidAddress(address.to_string()))?
        .connect()
        .await?;
    Ok(WorkerServiceClient::new(channel))
}

/// Issue one job assignment. Any transport or status failure is returned to
/// the dispatcher, which treats it as a signal to retry on another worker.
pub async fn assign_job(address: &str, spec: &JobSpec) -> Result<()> {
    let mut client = connect(address).await?;
    client.assign_job(spec.to_request()).await?;
    Ok(())
}

/// Ask a worker to shut down; returns the number of jobs it completed.
pub async fn shutdown_worker(address: &str) -> Result<u64> {
    let mut client = connect(address).await?;
    let reply = client.shutdown(ShutdownRequest {}).await?.into_inner();
    Ok(reply.jobs_completed)
}
