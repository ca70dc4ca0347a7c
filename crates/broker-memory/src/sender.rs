use crate::broker::MemoryBroker;
use crate::error::Error;

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use swim_broker::{Message, Sender};

/// Sender attached to the broker's topic exchange.
#[derive(Debug)]
pub struct MemorySender {
    broker: MemoryBroker,
    closed: AtomicBool,
}

impl MemorySender {
    pub(crate) const fn new(broker: MemoryBroker) -> Self {
        Self {
            broker,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Sender for MemorySender {
    type Error = Error;

    fn credit(&self) -> u32 {
        if self.closed.load(Ordering::SeqCst) {
            0
        } else {
            self.broker.credit()
        }
    }

    async fn send(&self, message: Message) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::LinkClosed);
        }

        self.broker.route(message);

        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
