//! Integration tests for vfleet-virt.
//!
//! These tests require:
//! - `virsh`, `ssh` and `scp` on the local machine
//! - a libvirt host reachable as root without a password
//!
//! Run with: `VFLEET_TEST_HOST=<host> cargo test -p vfleet-virt -- --ignored`

use vfleet_virt::{ControlPlane, RemoteShell, SshShell, VirshControlPlane};

fn test_host() -> Option<String> {
    match std::env::var("VFLEET_TEST_HOST") {
        Ok(host) => Some(host),
        Err(_) => {
            eprintln!("Skipping test: set VFLEET_TEST_HOST to a libvirt host");
            None
        }
    }
}

/// Define, start, inspect and remove a tiny network on a real host.
#[tokio::test]
#[ignore = "requires a reachable libvirt host"]
async fn test_network_lifecycle() {
    let Some(host) = test_host() else { return };
    let cp = VirshControlPlane::new("root", &host);

    let xml = "<network>\n  <name>vfleet_it_net</name>\n</network>\n";
    cp.create_network(xml).await.expect("Failed to create network");

    let names = cp.list_networks().await.expect("Failed to list networks");
    assert!(names.iter().any(|n| n == "vfleet_it_net"));

    let handle = cp
        .lookup_network("vfleet_it_net")
        .await
        .expect("Failed to look up network");
    assert!(!handle.uuid.is_empty());

    let leases = cp.dhcp_leases(&handle).await.expect("Failed to read leases");
    assert!(leases.is_empty());

    cp.destroy_network(&handle)
        .await
        .expect("Failed to destroy network");
}

/// Unknown names map to a not-found error rather than a command failure.
#[tokio::test]
#[ignore = "requires a reachable libvirt host"]
async fn test_lookup_missing_domain() {
    let Some(host) = test_host() else { return };
    let cp = VirshControlPlane::new("root", &host);

    let err = cp
        .lookup_domain("vfleet_it_does_not_exist")
        .await
        .unwrap_err();
    assert!(matches!(err, vfleet_virt::VirtError::NotFound { .. }));
}

/// Remote commands report their exit status instead of failing.
#[tokio::test]
#[ignore = "requires a reachable libvirt host"]
async fn test_remote_exit_status() {
    let Some(host) = test_host() else { return };
    let shell = SshShell::new("root", &host);

    let ok = shell.run(&["true".to_string()]).await.expect("ssh failed");
    assert!(ok.success());

    let failed = shell.run(&["false".to_string()]).await.expect("ssh failed");
    assert!(!failed.success());
}
