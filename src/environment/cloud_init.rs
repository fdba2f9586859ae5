use serde_yaml::{Mapping, Value};

use crate::error::{DriverError, Result};

/// First line of every cloud-config document
pub const CLOUD_CONFIG_HEADER: &str = "#cloud-config";

/// What to do when the merged key is already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeBehavior {
    /// Append the values to the existing sequence
    Append,
    /// Leave the existing value untouched
    Skip,
}

/// Merge `values` under `key` into a cloud-config document.
///
/// - Empty input is treated as an empty mapping.
/// - An absent key receives `values[0]` when `single_value` is set, otherwise
///   the whole `values` sequence.
/// - A present key is left alone under [`MergeBehavior::Skip`]. Under
///   [`MergeBehavior::Append`] the values are appended in order, which
///   requires the existing value to be a sequence.
///
/// The result is serialized back to YAML behind the `#cloud-config` header.
pub fn merge(
    document: &str,
    key: &str,
    values: Vec<Value>,
    single_value: bool,
    behavior: MergeBehavior,
) -> Result<String> {
    let mut root = parse_document(document)?;
    let yaml_key = Value::String(key.to_string());

    match root.get_mut(&yaml_key) {
        Some(_) if behavior == MergeBehavior::Skip => {
            tracing::debug!("cloud-init key '{}' already set, keeping it", key);
        }
        Some(Value::Sequence(existing)) => existing.extend(values),
        Some(_) => {
            return Err(DriverError::CloudInit(format!(
                "cannot append to non-list value at key '{}'",
                key
            )));
        }
        None if single_value => {
            let value = values.into_iter().next().ok_or_else(|| {
                DriverError::CloudInit(format!("no value given for key '{}'", key))
            })?;
            root.insert(yaml_key, value);
        }
        None => {
            root.insert(yaml_key, Value::Sequence(values));
        }
    }

    render(&root)
}

/// A `users` entry granting passwordless sudo and key based SSH access.
pub fn ssh_user_entry(user: &str, public_key: &str) -> Value {
    let mut entry = Mapping::new();
    entry.insert("name".into(), user.into());
    entry.insert("lock_passwd".into(), true.into());
    entry.insert("sudo".into(), "ALL=(ALL) NOPASSWD:ALL".into());
    entry.insert("create_groups".into(), false.into());
    entry.insert("no_user_group".into(), true.into());
    entry.insert(
        "ssh_authorized_keys".into(),
        Value::Sequence(vec![public_key.into()]),
    );
    Value::Mapping(entry)
}

/// Assemble the final user data for a machine.
///
/// The SSH user is added to `users` when it differs from `root` or when the
/// key has to travel through cloud-init; `hostname` is set to the machine
/// name unless the document already defines one.
pub fn build_user_data(
    document: &str,
    ssh_user: &str,
    public_key: &str,
    ssh_in_cloud_init: bool,
    hostname: &str,
) -> Result<String> {
    let mut document = document.to_string();

    if ssh_user != "root" || ssh_in_cloud_init {
        document = merge(
            &document,
            "users",
            vec![ssh_user_entry(ssh_user, public_key)],
            false,
            MergeBehavior::Append,
        )?;
    }

    merge(
        &document,
        "hostname",
        vec![Value::String(hostname.to_string())],
        true,
        MergeBehavior::Skip,
    )
}

fn parse_document(document: &str) -> Result<Mapping> {
    if document.trim().is_empty() {
        return Ok(Mapping::new());
    }

    match serde_yaml::from_str::<Value>(document)? {
        Value::Mapping(mapping) => Ok(mapping),
        Value::Null => Ok(Mapping::new()),
        _ => Err(DriverError::CloudInit(
            "cloud-init document must be a YAML mapping".to_string(),
        )),
    }
}

fn render(root: &Mapping) -> Result<String> {
    let body = serde_yaml::to_string(root)?;
    Ok(format!("{}\n{}", CLOUD_CONFIG_HEADER, body))
}
