//! SSH material for the machines we create.
//!
//! Each machine gets its own ed25519 key pair; the public half is handed to
//! the server's boot volume or to cloud-init.

pub mod keys;
