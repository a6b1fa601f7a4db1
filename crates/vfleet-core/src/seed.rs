//! First-boot seed data for the install-server.
//!
//! The two cloud-init documents are rendered locally, pushed to a scratch
//! directory on the target and packed into a `cidata` ISO next to the disks.

use crate::error::Result;
use crate::install_server::InstallServerInfo;
use crate::naming::NamingScheme;
use crate::remote::RemoteRunner;
use crate::templates::{MetaData, SeedAttributes, TemplateRenderer, UserData};

/// Volume label cloud-init looks for.
pub const SEED_VOLUME_ID: &str = "cidata";

/// Rendered seed documents of one domain and where they go on the target.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedBundle {
    /// Remote scratch directory.
    pub dir: String,
    /// Remote path of the seed image.
    pub image: String,
    /// `(file name, contents)` in copy order.
    pub files: Vec<(&'static str, String)>,
}

impl SeedBundle {
    /// Render the seed documents of the install-server.
    ///
    /// `pub_key` is the content of the SSH public key file; every non-empty
    /// line is authorized.
    pub fn render(
        renderer: &TemplateRenderer,
        naming: &NamingScheme,
        domain: &str,
        info: &InstallServerInfo,
        pub_key: &str,
    ) -> Result<Self> {
        let attrs = SeedAttributes {
            hostname: info.hostname.clone(),
            ssh_keys: pub_key
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(String::from)
                .collect(),
            ip: info.ip.clone(),
            network: info.network.clone(),
            netmask: info.netmask.clone(),
            gateway: info.gateway.clone(),
        };
        let files = vec![
            ("meta-data", renderer.render(&MetaData(&attrs))?),
            ("user-data", renderer.render(&UserData(&attrs))?),
        ];
        Ok(Self {
            dir: naming.seed_dir(domain),
            image: naming.seed_image(domain),
            files,
        })
    }

    fn remote_path(&self, name: &str) -> String {
        format!("{}/{}", self.dir, name)
    }

    /// Command authoring the seed image from the copied documents.
    pub fn iso_command(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "genisoimage",
            "-quiet",
            "-output",
            self.image.as_str(),
            "-volid",
            SEED_VOLUME_ID,
            "-joliet",
            "-rock",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(self.remote_path("user-data"));
        args.push(self.remote_path("meta-data"));
        args
    }

    /// Push the documents to the target and author the seed image.
    pub async fn push(&self, runner: &RemoteRunner<'_>) -> Result<()> {
        runner
            .run(&["mkdir".to_string(), "-p".to_string(), self.dir.clone()])
            .await?;
        for (name, contents) in &self.files {
            let local = tempfile::NamedTempFile::new()?;
            tokio::fs::write(local.path(), contents).await?;
            runner.copy(local.path(), &self.remote_path(name)).await?;
        }
        runner.run(&self.iso_command()).await?;
        tracing::info!(image = %self.image, "Seed image prepared");
        Ok(())
    }
}
