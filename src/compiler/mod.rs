pub mod block;
pub mod verify;
