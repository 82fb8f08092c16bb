pub mod transfer;

pub use transfer::{ReceivingOrg, TransferRequest, TransferStatus, TransferType};
