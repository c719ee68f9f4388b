// Role server wiring
// listener → queue → worker → bulk writer, one stop for all of them

use crate::handlers::RoleCtx;
use plid_network::{
    spawn_worker, BulkWriter, BulkWriterConfig, Dispatcher, ListenerConfig, NetError, RawRequest,
    RequestListener, RequestQueue, Service,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// The three pipeline threads of one role. Dropping (or `stop`ping) shuts
/// them down in order: no new accepts, worker drains, writer finishes
/// in-flight responses.
pub struct RoleServer {
    local_addr: SocketAddr,
    listener: Service,
    worker: Service,
    writer: Option<BulkWriter>,
}

impl RoleServer {
    pub fn start(
        listener_config: ListenerConfig,
        dispatcher: Dispatcher<RoleCtx>,
        ctx: Arc<RoleCtx>,
    ) -> Result<RoleServer, NetError> {
        let queue = Arc::new(RequestQueue::<RawRequest>::new());

        let listener = RequestListener::bind(&listener_config)?;
        let local_addr = listener.local_addr();
        let listener = listener.spawn(Arc::clone(&queue))?;

        let writer = BulkWriter::spawn(
            BulkWriterConfig::default(),
            Some(Box::new(|err| warn!(%err, "response write failed"))),
        )?;
        let worker = spawn_worker(queue, dispatcher, ctx, writer.handle())?;

        info!(%local_addr, "role server started");
        Ok(RoleServer {
            local_addr,
            listener,
            worker,
            writer: Some(writer),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stop(mut self) {
        self.listener.stop();
        self.worker.stop();
        if let Some(writer) = self.writer.take() {
            writer.shutdown();
        }
    }
}

/// Park the main thread until SIGINT, polling the flag so shutdown is
/// observed within a bounded interval.
pub fn wait_for_shutdown() -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicBool, Ordering};

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst))?;

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(250));
    }
    Ok(())
}
