// Wire protocol for the tabula-board.v1 WebSocket sub-protocol.

pub mod event;
pub mod frame;
pub mod topic;
