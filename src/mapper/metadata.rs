use crate::domain::field::{FieldMap, FieldValue, merge_fields};
use std::net::{IpAddr, ToSocketAddrs};
use uuid::Uuid;

pub const AGENT_TYPE: &str = "ecs-log-shipper";
pub const ECS_VERSION: &str = "1.4.0";

/// Agent and host description written into every document. Computed once
/// per handler; the ephemeral id changes with every handler instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticMetadata {
    pub agent_ephemeral_id: Uuid,
    pub agent_version: String,
    pub hostname: String,
    /// Empty when the hostname does not resolve.
    pub host_ip: String,
}

impl StaticMetadata {
    pub fn detect() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_default();
        let host_ip = resolve_ip(&hostname)
            .map(|ip| ip.to_string())
            .unwrap_or_default();
        Self::with_host(hostname, host_ip)
    }

    pub fn with_host(hostname: impl Into<String>, host_ip: impl Into<String>) -> Self {
        Self {
            agent_ephemeral_id: Uuid::new_v4(),
            agent_version: crate::VERSION.to_string(),
            hostname: hostname.into(),
            host_ip: host_ip.into(),
        }
    }

    /// Merges the `agent`, `host` and `ecs` blocks into `fields`. Keys set
    /// here replace same-named keys in the blocks; other keys survive.
    pub fn apply(&self, fields: &mut FieldMap) {
        let mut agent = FieldMap::new();
        agent.insert("ephemeral_id".to_string(), self.agent_ephemeral_id.into());
        agent.insert("type".to_string(), AGENT_TYPE.into());
        agent.insert("version".to_string(), self.agent_version.clone().into());

        let mut host = FieldMap::new();
        for key in ["hostname", "name", "id"] {
            host.insert(key.to_string(), self.hostname.clone().into());
        }
        host.insert("ip".to_string(), self.host_ip.clone().into());

        let mut ecs = FieldMap::new();
        ecs.insert("version".to_string(), ECS_VERSION.into());

        let mut block = FieldMap::new();
        block.insert("agent".to_string(), FieldValue::Map(agent));
        block.insert("host".to_string(), FieldValue::Map(host));
        block.insert("ecs".to_string(), FieldValue::Map(ecs));
        merge_fields(fields, block);
    }
}

fn resolve_ip(hostname: &str) -> Option<IpAddr> {
    if hostname.is_empty() {
        return None;
    }
    let addrs: Vec<IpAddr> = (hostname, 0)
        .to_socket_addrs()
        .ok()?
        .map(|addr| addr.ip())
        .collect();
    addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_keeps_user_keys_in_blocks() {
        let metadata = StaticMetadata::with_host("web-1", "10.0.0.7");
        let mut fields = FieldMap::new();
        crate::domain::field::child_map(&mut fields, "host")
            .insert("region".to_string(), "eu".into());
        crate::domain::field::child_map(&mut fields, "ecs")
            .insert("version".to_string(), "0.1".into());

        metadata.apply(&mut fields);

        let host = fields["host"].as_map().unwrap();
        assert_eq!(host["region"], FieldValue::from("eu"));
        assert_eq!(host["name"], FieldValue::from("web-1"));
        assert_eq!(host["id"], FieldValue::from("web-1"));
        assert_eq!(host["ip"], FieldValue::from("10.0.0.7"));
        assert_eq!(fields["ecs"].as_map().unwrap()["version"], FieldValue::from(ECS_VERSION));
        assert_eq!(
            fields["agent"].as_map().unwrap()["type"],
            FieldValue::from(AGENT_TYPE)
        );
    }

    #[test]
    fn test_ephemeral_id_differs_per_instance() {
        let first = StaticMetadata::with_host("h", "");
        let second = StaticMetadata::with_host("h", "");
        assert_ne!(first.agent_ephemeral_id, second.agent_ephemeral_id);
        assert_eq!(first.agent_ephemeral_id.get_version_num(), 4);
    }

    #[test]
    fn test_unresolvable_host_has_no_ip() {
        assert_eq!(resolve_ip(""), None);
        assert_eq!(resolve_ip("localhost").map(|ip| ip.is_loopback()), Some(true));
    }
}
