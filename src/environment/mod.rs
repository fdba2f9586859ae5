//! Machine environment bootstrap (cloud-init user data).

pub mod cloud_init;
