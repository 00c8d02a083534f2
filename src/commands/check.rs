//! Check command implementation.
//!
//! Validates system requirements and configuration.

use herakles_conntrack_exporter::{ConnectionSource, ProcConntrackSource};

use crate::config::{validate_effective_config, Config};
use crate::state::build_lister;

/// Validates system requirements and configuration.
pub fn command_check(
    conntrack: bool,
    workloads: bool,
    all: bool,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Herakles Conntrack Exporter - System Check");
    println!("=============================================");

    let mut all_ok = true;

    // Check the connection tracking table
    if conntrack || all {
        let path = config.conntrack_path();
        println!("\n📁 Checking conntrack table {}...", path.display());
        match ProcConntrackSource::new(path.clone()).connections() {
            Ok(conns) => {
                println!("   ✅ Conntrack table readable");
                println!("   ✅ Parsed {} connection entries", conns.len());
            }
            Err(e) => {
                println!("   ❌ {}", e);
                println!("      Is the nf_conntrack module loaded? (modprobe nf_conntrack)");
                all_ok = false;
            }
        }
    }

    // Check the workload source
    if workloads || all {
        println!("\n📦 Checking workload source...");
        let lister = build_lister(config);
        match lister.workloads() {
            Ok(list) => {
                let with_ip = list.iter().filter(|w| !w.ip.is_empty()).count();
                println!(
                    "   ✅ {} workloads listed ({} with an address), label '{}'",
                    list.len(),
                    with_ip,
                    lister.kind()
                );
                if list.is_empty() {
                    println!("   ⚠️  No workloads configured - no connection series will be exported");
                }
            }
            Err(e) => {
                println!("   ❌ {}", e);
                all_ok = false;
            }
        }
    }

    // Check configuration
    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => {
            println!("   ✅ Configuration is valid");
        }
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - system is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review warnings");
        std::process::exit(1);
    }
}
