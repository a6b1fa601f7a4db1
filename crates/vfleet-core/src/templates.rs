//! Document rendering.
//!
//! Every rendered document has its own attribute struct. Attributes are
//! validated, serialized into a Tera context and rendered against a template
//! compiled into the binary. Optional attributes are left out of the context
//! when unset, so templates test them with `is defined`.

use crate::error::{CoreError, Result};
use serde::Serialize;
use tera::{Context, Tera};

/// Templates compiled into the binary: (name, content).
const EMBEDDED_TEMPLATES: &[(&str, &str)] = &[
    ("network.xml.tera", include_str!("../templates/network.xml.tera")),
    ("domain.xml.tera", include_str!("../templates/domain.xml.tera")),
    ("user-data.tera", include_str!("../templates/user-data.tera")),
    ("meta-data.tera", include_str!("../templates/meta-data.tera")),
];

/// Attribute set of one kind of document.
pub trait DocumentAttributes: Serialize {
    /// Name of the embedded template rendering this attribute set.
    const TEMPLATE: &'static str;

    /// Reject attribute sets that would render a broken document.
    fn validate(&self) -> Result<()>;
}

/// Renders attribute sets with the embedded templates.
pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    /// Compile the embedded templates.
    pub fn from_embedded() -> Result<Self> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.add_raw_templates(EMBEDDED_TEMPLATES.iter().copied())?;
        tracing::debug!(count = EMBEDDED_TEMPLATES.len(), "Loaded embedded templates");
        Ok(Self { tera })
    }

    /// Validate and render an attribute set.
    pub fn render<A: DocumentAttributes>(&self, attrs: &A) -> Result<String> {
        attrs.validate()?;
        let context = Context::from_serialize(attrs)?;
        let rendered = self.tera.render(A::TEMPLATE, &context)?;
        tracing::trace!(template = A::TEMPLATE, bytes = rendered.len(), "Rendered template");
        Ok(rendered)
    }
}

fn require(kind: &str, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CoreError::InvalidDocument(format!("{kind}: {field} is empty")));
    }
    Ok(())
}

/// Attributes of a virtual network document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkAttributes {
    pub name: String,
    pub uuid: String,
    pub bridge_name: String,
    pub mac: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dhcp: Option<DhcpAttributes>,
}

/// NAT forwarding with a DHCP server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DhcpAttributes {
    pub address: String,
    pub netmask: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<DhcpRangeAttributes>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DhcpRangeAttributes {
    pub start: String,
    pub end: String,
}

impl DocumentAttributes for NetworkAttributes {
    const TEMPLATE: &'static str = "network.xml.tera";

    fn validate(&self) -> Result<()> {
        require("network", "name", &self.name)?;
        require("network", "uuid", &self.uuid)?;
        require("network", "bridge_name", &self.bridge_name)?;
        require("network", "mac", &self.mac)?;
        if let Some(dhcp) = &self.dhcp {
            require("network", "dhcp.address", &dhcp.address)?;
            require("network", "dhcp.netmask", &dhcp.netmask)?;
        }
        Ok(())
    }
}

/// Attributes of a domain document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostAttributes {
    pub hostname: String,
    pub hostname_with_prefix: String,
    pub uuid: String,
    /// Memory in KiB.
    pub memory: u64,
    pub ncpus: u32,
    pub emulator: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    /// First-boot seed image, only set for the install-server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_image: Option<String>,
    pub disks: Vec<DiskAttributes>,
    pub nics: Vec<NicAttributes>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskAttributes {
    /// Guest device name, `vda`, `vdb`, ...
    pub name: String,
    /// Disk image path on the host.
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boot_order: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NicAttributes {
    pub mac: String,
    pub name: String,
    pub network_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boot_order: Option<u8>,
}

impl DocumentAttributes for HostAttributes {
    const TEMPLATE: &'static str = "domain.xml.tera";

    fn validate(&self) -> Result<()> {
        require("host", "hostname_with_prefix", &self.hostname_with_prefix)?;
        require("host", "uuid", &self.uuid)?;
        require("host", "emulator", &self.emulator)?;
        if self.memory == 0 || self.ncpus == 0 {
            return Err(CoreError::InvalidDocument(format!(
                "host {}: memory and ncpus must be > 0",
                self.hostname
            )));
        }
        for disk in &self.disks {
            require("disk", "path", &disk.path)?;
        }
        for nic in &self.nics {
            require("nic", "mac", &nic.mac)?;
            require("nic", "network_name", &nic.network_name)?;
        }
        let boot_entries = self.disks.iter().filter(|d| d.boot_order.is_some()).count()
            + self.nics.iter().filter(|n| n.boot_order.is_some()).count();
        if boot_entries > 2 {
            return Err(CoreError::InvalidDocument(format!(
                "host {}: too many boot devices",
                self.hostname
            )));
        }
        Ok(())
    }
}

/// Attributes shared by the two first-boot seed documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeedAttributes {
    pub hostname: String,
    /// Lines of the authorized public key file.
    pub ssh_keys: Vec<String>,
    pub ip: String,
    pub network: String,
    pub netmask: String,
    pub gateway: String,
}

impl SeedAttributes {
    fn check(&self) -> Result<()> {
        require("seed", "hostname", &self.hostname)?;
        require("seed", "ip", &self.ip)?;
        if self.ssh_keys.iter().all(|k| k.trim().is_empty()) {
            return Err(CoreError::InvalidDocument(
                "seed: no SSH public key to authorize".into(),
            ));
        }
        Ok(())
    }
}

/// The cloud-init `user-data` document.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct UserData<'a>(pub &'a SeedAttributes);

impl DocumentAttributes for UserData<'_> {
    const TEMPLATE: &'static str = "user-data.tera";

    fn validate(&self) -> Result<()> {
        self.0.check()
    }
}

/// The cloud-init `meta-data` document.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct MetaData<'a>(pub &'a SeedAttributes);

impl DocumentAttributes for MetaData<'_> {
    const TEMPLATE: &'static str = "meta-data.tera";

    fn validate(&self) -> Result<()> {
        self.0.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer() -> TemplateRenderer {
        TemplateRenderer::from_embedded().unwrap()
    }

    fn network(dhcp: Option<DhcpAttributes>) -> NetworkAttributes {
        NetworkAttributes {
            name: "nat".into(),
            uuid: "6f1c0e9a-0000-4000-8000-000000000001".into(),
            bridge_name: "virbr42".into(),
            mac: "52:54:00:01:02:03".into(),
            dhcp,
        }
    }

    fn host() -> HostAttributes {
        HostAttributes {
            hostname: "node1".into(),
            hostname_with_prefix: "t1_node1".into(),
            uuid: "6f1c0e9a-0000-4000-8000-000000000002".into(),
            memory: 4_194_304,
            ncpus: 2,
            emulator: "/usr/bin/qemu-system-x86_64".into(),
            serial: None,
            product_name: None,
            seed_image: None,
            disks: vec![
                DiskAttributes {
                    name: "vda".into(),
                    path: "/var/lib/libvirt/images/t1_node1-000.qcow2".into(),
                    boot_order: Some(1),
                },
                DiskAttributes {
                    name: "vdb".into(),
                    path: "/var/lib/libvirt/images/t1_node1-001.qcow2".into(),
                    boot_order: None,
                },
            ],
            nics: vec![NicAttributes {
                mac: "52:54:00:0a:0b:0c".into(),
                name: "noname0".into(),
                network_name: "t1_sps".into(),
                boot_order: Some(2),
            }],
        }
    }

    fn seed() -> SeedAttributes {
        SeedAttributes {
            hostname: "router".into(),
            ssh_keys: vec!["ssh-rsa AAAA user@box\n".into(), "ssh-ed25519 BBBB other\n".into()],
            ip: "10.0.0.1".into(),
            network: "10.0.0.0".into(),
            netmask: "255.255.255.0".into(),
            gateway: "10.0.0.1".into(),
        }
    }

    /// Reference rendering of a private network, kept byte for byte.
    const PRIVATE_NETWORK_XML: &str = r#"
<network>
  <name>t1_sps</name>
  <uuid>6f1c0e9a-0000-4000-8000-000000000001</uuid>
  <bridge name='virbr42' stp='on' delay='0'/>
  <mac address='52:54:00:01:02:03'/>

</network>
"#;

    /// Reference rendering of a single-disk, single-NIC compute domain.
    const COMPUTE_DOMAIN_XML: &str = r#"
<domain type='kvm'>
  <name>t1_node1</name>
  <uuid>6f1c0e9a-0000-4000-8000-000000000002</uuid>
  <memory unit='KiB'>4194304</memory>
  <currentmemory unit='KiB'>4194304</currentmemory>
  <vcpu>1</vcpu>
  <os>
    <smbios mode='sysinfo'/>
    <type arch='x86_64' machine='pc'>hvm</type>
    <bios useserial='yes' rebootTimeout='5000'/>
  </os>
  <sysinfo type='smbios'>
    <bios>
      <entry name='vendor'>eNovance</entry>
    </bios>
    <system>
      <entry name='manufacturer'>QEMU</entry>
      <entry name='product'>virtualizor</entry>
      <entry name='version'>1.0</entry>
    </system>
  </sysinfo>
  <features>
    <acpi/>
    <apic/>
    <pae/>
  </features>
  <clock offset='utc'/>
  <on_poweroff>restart</on_poweroff>
  <on_reboot>restart</on_reboot>
  <on_crash>restart</on_crash>
  <devices>
    <emulator>/usr/bin/qemu-system-x86_64</emulator>

    <disk type='file' device='disk'>
      <driver name='qemu' type='qcow2'/>
      <source file='/var/lib/libvirt/images/t1_node1-000.qcow2'/>
      <target dev='vda' bus='virtio'/>

      <boot order='1'/>

    </disk>




    <interface type='network'>
      <mac address='52:54:00:0a:0b:0c'/>
      <source network='t1_sps'/>
      <model type='virtio'/>

      <boot order='2'/>

    </interface>


    <serial type='pty'>
      <target port='0'/>
    </serial>
    <console type='pty'>
      <target type='serial' port='0'/>
    </console>
    <input type='mouse' bus='ps2'/>
    <graphics type='vnc' port='-1' autoport='yes'/>
    <video>
      <model type='cirrus' vram='9216' heads='1'/>
    </video>
  </devices>
</domain>
"#;

    #[test]
    fn test_embedded_templates_load() {
        let renderer = renderer();
        let mut names: Vec<&str> = renderer.tera.get_template_names().collect();
        names.sort();
        assert_eq!(
            names,
            vec!["domain.xml.tera", "meta-data.tera", "network.xml.tera", "user-data.tera"]
        );
    }

    #[test]
    fn test_private_network_matches_deployed_document() {
        let mut attrs = network(None);
        attrs.name = "t1_sps".into();
        assert_eq!(renderer().render(&attrs).unwrap(), PRIVATE_NETWORK_XML);
    }

    #[test]
    fn test_compute_domain_matches_deployed_document() {
        let mut attrs = host();
        attrs.ncpus = 1;
        attrs.disks.truncate(1);
        assert_eq!(renderer().render(&attrs).unwrap(), COMPUTE_DOMAIN_XML);
    }

    #[test]
    fn test_private_network_has_no_dhcp() {
        let xml = renderer().render(&network(None)).unwrap();
        assert!(xml.contains("<name>nat</name>"));
        assert!(xml.contains("<bridge name='virbr42' stp='on' delay='0'/>"));
        assert!(xml.contains("<mac address='52:54:00:01:02:03'/>"));
        assert!(!xml.contains("<forward"));
        assert!(!xml.contains("<dhcp>"));
    }

    #[test]
    fn test_nat_network_with_range() {
        let xml = renderer()
            .render(&network(Some(DhcpAttributes {
                address: "192.168.140.1".into(),
                netmask: "255.255.255.0".into(),
                range: Some(DhcpRangeAttributes {
                    start: "192.168.140.2".into(),
                    end: "192.168.140.254".into(),
                }),
            })))
            .unwrap();
        assert!(xml.contains("<forward mode='nat'>"));
        assert!(xml.contains("<port start='1024' end='65535'/>"));
        assert!(xml.contains("<ip address='192.168.140.1' netmask='255.255.255.0'>"));
        assert!(xml.contains("<range start='192.168.140.2' end='192.168.140.254' />"));
    }

    #[test]
    fn test_dhcp_without_range() {
        let xml = renderer()
            .render(&network(Some(DhcpAttributes {
                address: "192.168.1.1".into(),
                netmask: "255.255.255.0".into(),
                range: None,
            })))
            .unwrap();
        assert!(xml.contains("<dhcp>"));
        assert!(!xml.contains("<range"));
    }

    #[test]
    fn test_domain_document() {
        let xml = renderer().render(&host()).unwrap();
        assert!(xml.starts_with("\n<domain type='kvm'>\n"));
        assert!(xml.contains("<name>t1_node1</name>"));
        assert!(xml.contains("<memory unit='KiB'>4194304</memory>"));
        assert!(xml.contains("<vcpu>2</vcpu>"));
        assert!(xml.contains("<emulator>/usr/bin/qemu-system-x86_64</emulator>"));
        assert!(xml.contains("<entry name='product'>virtualizor</entry>"));
        assert!(!xml.contains("name='serial'"));
        assert!(xml.contains("<target dev='vda' bus='virtio'/>"));
        assert!(xml.contains("<target dev='vdb' bus='virtio'/>"));
        assert!(xml.contains("<source network='t1_sps'/>"));
        assert!(!xml.contains("vdz"));
        assert_eq!(xml.matches("<boot order='1'/>").count(), 1);
        assert_eq!(xml.matches("<boot order='2'/>").count(), 1);
    }

    #[test]
    fn test_domain_smbios_overrides_and_seed() {
        let mut attrs = host();
        attrs.serial = Some("CZ1234".into());
        attrs.product_name = Some("ProLiant DL360 Gen9".into());
        attrs.seed_image = Some("/var/lib/libvirt/images/t1_node1_cloud-init.iso".into());
        let xml = renderer().render(&attrs).unwrap();
        assert!(xml.contains("<entry name='product'>ProLiant DL360 Gen9</entry>"));
        assert!(xml.contains("<entry name='serial'>CZ1234</entry>"));
        assert!(xml.contains("file='/var/lib/libvirt/images/t1_node1_cloud-init.iso'/>"));
        assert!(xml.contains("<target dev='vdz' bus='virtio'/>"));
    }

    #[test]
    fn test_values_are_not_escaped() {
        let xml = renderer().render(&host()).unwrap();
        assert!(xml.contains("/var/lib/libvirt/images/t1_node1-000.qcow2"));
        assert!(!xml.contains("&#x2F;"));
    }

    #[test]
    fn test_host_validation() {
        let mut attrs = host();
        attrs.nics[0].network_name.clear();
        assert!(matches!(
            renderer().render(&attrs),
            Err(CoreError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_user_data() {
        let seed = seed();
        let doc = renderer().render(&UserData(&seed)).unwrap();
        assert!(doc.starts_with("#cloud-config\n"));
        assert_eq!(doc.matches("   - ssh-rsa AAAA user@box\n").count(), 2);
        assert_eq!(doc.matches("   - ssh-ed25519 BBBB other\n").count(), 2);
        assert!(doc.contains("IPADDR=10.0.0.1\n"));
        assert!(doc.contains("NETWORK=10.0.0.0\n"));
        assert!(doc.contains("NETMASK=255.255.255.0\n"));
        assert!(doc.contains("#      GATEWAY=10.0.0.1\n"));
        assert!(doc.contains("HOSTNAME=router\n"));
    }

    #[test]
    fn test_meta_data() {
        let seed = seed();
        let doc = renderer().render(&MetaData(&seed)).unwrap();
        assert_eq!(doc, "instance-id: router\nlocal-hostname: router\n");
    }

    #[test]
    fn test_seed_requires_key() {
        let mut seed = seed();
        seed.ssh_keys = vec!["\n".into()];
        assert!(renderer().render(&UserData(&seed)).is_err());
    }
}
