//! Network builder.

use crate::error::Result;
use crate::templates::{DhcpAttributes, DhcpRangeAttributes, NetworkAttributes, TemplateRenderer};
use crate::util::{random_bridge_name, random_mac};
use uuid::Uuid;

/// Gateway address of the public NAT network.
pub const PUBLIC_GATEWAY: &str = "192.168.140.1";
/// Netmask of the public NAT network.
pub const PUBLIC_NETMASK: &str = "255.255.255.0";
/// First address leased on the public NAT network.
pub const PUBLIC_RANGE_START: &str = "192.168.140.2";
/// Last address leased on the public NAT network.
pub const PUBLIC_RANGE_END: &str = "192.168.140.254";

/// Overridable parts of a network definition.
///
/// Unset fields are generated by [`NetworkBuilder::build`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkDefinition {
    pub uuid: Option<String>,
    pub mac: Option<String>,
    pub dhcp: Option<DhcpDefinition>,
}

/// NAT forwarding with a DHCP server.
#[derive(Debug, Clone, PartialEq)]
pub struct DhcpDefinition {
    pub address: String,
    pub netmask: String,
    pub range: Option<(String, String)>,
}

impl NetworkDefinition {
    /// An isolated network without forwarding or DHCP.
    pub fn private() -> Self {
        Self::default()
    }

    /// The public NAT network the install-server obtains its lease from.
    pub fn public_nat() -> Self {
        Self {
            dhcp: Some(DhcpDefinition {
                address: PUBLIC_GATEWAY.to_string(),
                netmask: PUBLIC_NETMASK.to_string(),
                range: Some((PUBLIC_RANGE_START.to_string(), PUBLIC_RANGE_END.to_string())),
            }),
            ..Self::default()
        }
    }
}

/// A rendered network document ready for the control plane.
#[derive(Debug, Clone)]
pub struct NetworkDocument {
    pub name: String,
    pub attributes: NetworkAttributes,
    pub xml: String,
}

/// Turns network definitions into control-plane documents.
pub struct NetworkBuilder<'a> {
    renderer: &'a TemplateRenderer,
}

impl<'a> NetworkBuilder<'a> {
    pub fn new(renderer: &'a TemplateRenderer) -> Self {
        Self { renderer }
    }

    /// Fill in generated defaults and render the document.
    pub fn build(&self, name: &str, definition: &NetworkDefinition) -> Result<NetworkDocument> {
        let attributes = NetworkAttributes {
            name: name.to_string(),
            uuid: definition
                .uuid
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            bridge_name: random_bridge_name(),
            mac: definition.mac.clone().unwrap_or_else(random_mac),
            dhcp: definition.dhcp.as_ref().map(|dhcp| DhcpAttributes {
                address: dhcp.address.clone(),
                netmask: dhcp.netmask.clone(),
                range: dhcp.range.as_ref().map(|(start, end)| DhcpRangeAttributes {
                    start: start.clone(),
                    end: end.clone(),
                }),
            }),
        };
        let xml = self.renderer.render(&attributes)?;
        tracing::debug!(network = %name, bridge = %attributes.bridge_name, "Built network document");
        Ok(NetworkDocument {
            name: name.to_string(),
            attributes,
            xml,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_network_defaults() {
        let renderer = TemplateRenderer::from_embedded().unwrap();
        let doc = NetworkBuilder::new(&renderer)
            .build("t1_sps", &NetworkDefinition::private())
            .unwrap();
        assert_eq!(doc.name, "t1_sps");
        assert!(Uuid::parse_str(&doc.attributes.uuid).is_ok());
        assert!(doc.attributes.mac.starts_with("52:54:00:"));
        assert!(doc.attributes.bridge_name.starts_with("virbr"));
        assert!(doc.attributes.dhcp.is_none());
        assert!(doc.xml.contains("<name>t1_sps</name>"));
        assert!(!doc.xml.contains("<forward"));
    }

    #[test]
    fn test_public_nat_network() {
        let renderer = TemplateRenderer::from_embedded().unwrap();
        let doc = NetworkBuilder::new(&renderer)
            .build("nat", &NetworkDefinition::public_nat())
            .unwrap();
        assert!(doc.xml.contains("<forward mode='nat'>"));
        assert!(doc
            .xml
            .contains("<ip address='192.168.140.1' netmask='255.255.255.0'>"));
        assert!(doc
            .xml
            .contains("<range start='192.168.140.2' end='192.168.140.254' />"));
    }

    #[test]
    fn test_overrides_are_kept() {
        let renderer = TemplateRenderer::from_embedded().unwrap();
        let definition = NetworkDefinition {
            uuid: Some("11111111-2222-4333-8444-555555555555".into()),
            mac: Some("52:54:00:12:34:56".into()),
            dhcp: None,
        };
        let doc = NetworkBuilder::new(&renderer).build("n", &definition).unwrap();
        assert!(doc
            .xml
            .contains("<uuid>11111111-2222-4333-8444-555555555555</uuid>"));
        assert!(doc.xml.contains("<mac address='52:54:00:12:34:56'/>"));
    }

    #[test]
    fn test_generated_values_differ() {
        let renderer = TemplateRenderer::from_embedded().unwrap();
        let builder = NetworkBuilder::new(&renderer);
        let a = builder.build("a", &NetworkDefinition::private()).unwrap();
        let b = builder.build("b", &NetworkDefinition::private()).unwrap();
        assert_ne!(a.attributes.uuid, b.attributes.uuid);
    }
}
