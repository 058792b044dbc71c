use crate::{queue_messages, target_txs};

impl target_txs::Model {
    pub fn validated_block_height(&self) -> Option<u64> {
        self.block_height.map(|height| height.max(0) as u64)
    }
}

impl queue_messages::Model {
    pub fn validated_receive_count(&self) -> u32 {
        self.receive_count.max(0) as u32
    }
}
