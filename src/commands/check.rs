//! Check command implementation.
//!
//! Validates /proc readability and configuration.

use ps_census::process::{list_pids, read_cgroup, read_cmdline, read_status, StatusPatterns};

use crate::config::{validate_effective_config, Config};

/// Validates system requirements and configuration.
pub fn command_check(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 ps-census - System Check");
    println!("============================");

    let mut all_ok = true;
    let options = config.scanner_options();

    println!("\n📁 Checking process registry {}...", options.root.display());
    match list_pids(&options.root, None) {
        Ok(pids) if pids.is_empty() => {
            println!("   ❌ No process entries found");
            all_ok = false;
        }
        Ok(pids) => println!("   ✅ Can list {} process entries", pids.len()),
        Err(e) => {
            println!("   ❌ Cannot list process registry: {}", e);
            all_ok = false;
        }
    }

    println!("\n🧩 Checking per-process documents...");
    let patterns = StatusPatterns::compile()?;
    println!("   ✅ Status patterns compiled");

    let own_path = options.root.join(std::process::id().to_string());
    match read_cgroup(&own_path, options.unified_fallback) {
        Ok(cgroup) => println!("   ✅ cgroup: {}", cgroup),
        Err(e) => {
            println!("   ❌ cgroup: {}", e);
            if !options.unified_fallback {
                println!("      Hint: on cgroup v2-only hosts enable cgroup_v2_fallback");
            }
            all_ok = false;
        }
    }
    match read_status(&patterns, &own_path) {
        Ok(fields) => println!(
            "   ✅ status: VmRSS={} kB, NSpid={}",
            fields
                .memory
                .vm_rss
                .map_or_else(|| "-".to_string(), |v| v.to_string()),
            fields
                .namespace_pid
                .map_or_else(|| "-".to_string(), |v| v.to_string())
        ),
        Err(e) => {
            println!("   ❌ status: {}", e);
            all_ok = false;
        }
    }
    match read_cmdline(&own_path) {
        Ok(cmd) => println!("   ✅ cmdline: {}", cmd),
        Err(e) => {
            println!("   ❌ cmdline: {}", e);
            all_ok = false;
        }
    }

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => println!("   ✅ Configuration is valid"),
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
