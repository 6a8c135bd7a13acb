// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 probe CLI
//!
//! A small tool to exercise the command layer against real hardware.
//!
//! Usage:
//!   tpm2-probe [command]
//!
//! Commands:
//!   info       - Show TPM device info
//!   startup    - Send TPM2_Startup(CLEAR)
//!   random     - Generate random bytes
//!   pcr-read   - Read PCR values
//!   pcr-extend - Extend PCR 23 with a test digest
//!   caps       - Dump TPM properties
//!   all        - Run all tests

use std::env;

use anyhow::{Context, Result};
use tpm2_proto::{
    name_from_handle, tpm_rh, PasswordAuthorizationDelegate, Tpm, TpmAlgId, TpmCap, TpmDevice,
    TpmSu, TpmlDigestValues, TpmlPcrSelection, TpmtHa, TpmuCapabilities,
};

fn main() {
    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("all");

    println!("=== TPM 2.0 Probe ===\n");

    let result = match command {
        "info" => probe_info(),
        "startup" => probe_startup(),
        "random" => probe_random(),
        "pcr-read" => probe_pcr_read(),
        "pcr-extend" => probe_pcr_extend(),
        "caps" => probe_capabilities(),
        "all" => probe_info()
            .and_then(|_| probe_random())
            .and_then(|_| probe_pcr_read())
            .and_then(|_| probe_capabilities()),
        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!("Available commands: info, startup, random, pcr-read, pcr-extend, caps, all");
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("✗ {:#}", e);
        std::process::exit(1);
    }
}

fn open_tpm() -> Result<Tpm<TpmDevice>> {
    let device = TpmDevice::detect().context("no TPM device available")?;
    println!("  device: {}", device.path());
    Ok(Tpm::new(device))
}

fn probe_info() -> Result<()> {
    println!("--- Device Info ---");
    let tpm = open_tpm()?;
    println!("✓ TPM device opened: {}\n", tpm.transceiver().path());
    Ok(())
}

fn probe_startup() -> Result<()> {
    println!("--- Startup ---");
    let mut tpm = open_tpm()?;
    match tpm.startup_sync(TpmSu::Clear, None) {
        Ok(()) => println!("✓ TPM2_Startup(CLEAR) succeeded\n"),
        // Most kernels have already started the TPM.
        Err(rc) if rc == tpm2_proto::TpmRc::INITIALIZE => {
            println!("  TPM already initialized\n")
        }
        Err(rc) => return Err(anyhow::anyhow!("TPM2_Startup failed: {rc}")),
    }
    Ok(())
}

fn probe_random() -> Result<()> {
    println!("--- Random Number Generation ---");
    let mut tpm = open_tpm()?;
    let random = tpm
        .get_random_sync(32, None)
        .context("TPM2_GetRandom failed")?;
    println!("✓ {} random bytes:", random.buffer.len());
    println!("  {}\n", hex::encode(&random.buffer));
    Ok(())
}

fn probe_pcr_read() -> Result<()> {
    println!("--- PCR Read ---");
    let mut tpm = open_tpm()?;
    let selection = TpmlPcrSelection::single(TpmAlgId::Sha256, &[0, 1, 2, 7]);
    let (update_counter, selection_out, values) = tpm
        .pcr_read_sync(&selection, None)
        .context("TPM2_PCR_Read failed")?;
    println!("✓ update counter {}", update_counter);

    let mut digests = values.digests.iter();
    for bank in &selection_out.pcr_selections {
        for (byte_idx, byte) in bank.pcr_select.iter().enumerate() {
            for bit in 0..8 {
                if byte & (1 << bit) != 0 {
                    if let Some(digest) = digests.next() {
                        println!(
                            "  PCR[{}] = {}",
                            byte_idx * 8 + bit,
                            hex::encode(&digest.buffer)
                        );
                    }
                }
            }
        }
    }
    println!();
    Ok(())
}

fn probe_pcr_extend() -> Result<()> {
    println!("--- PCR Extend ---");
    println!("  Note: this extends PCR 23, which is typically resettable");
    let mut tpm = open_tpm()?;

    let pcr: u32 = 23;
    let mut delegate = PasswordAuthorizationDelegate::new(Vec::new());
    let digests = TpmlDigestValues::single(TpmtHa::sha256(vec![0x42; 32]));
    tpm.pcr_extend_sync(
        pcr,
        &name_from_handle(pcr),
        &digests,
        Some(&mut delegate),
    )
    .context("TPM2_PCR_Extend failed")?;
    println!("✓ extended PCR {}\n", pcr);
    Ok(())
}

fn probe_capabilities() -> Result<()> {
    println!("--- Capabilities ---");
    let mut tpm = open_tpm()?;

    // TPM_PT_FIXED starts at 0x100; ask for the first group.
    let (more_data, capability_data) = tpm
        .get_capability_sync(TpmCap::TpmProperties, 0x100, 16, None)
        .context("TPM2_GetCapability failed")?;
    println!("✓ more_data = {}", more_data);
    match capability_data.data {
        TpmuCapabilities::TpmProperties(properties) => {
            for property in &properties.tpm_property {
                println!("  PT 0x{:08x} = 0x{:08x}", property.property, property.value);
            }
        }
        other => println!("  unexpected capability payload: {:?}", other),
    }

    // Owner-hierarchy handles, to show the handle variant too.
    let (_, capability_data) = tpm
        .get_capability_sync(TpmCap::Handles, tpm_rh::OWNER & 0xFF000000, 8, None)
        .context("TPM2_GetCapability(handles) failed")?;
    if let TpmuCapabilities::Handles(handles) = capability_data.data {
        println!("  {} permanent handles reported", handles.handle.len());
    }
    println!();
    Ok(())
}
