// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2024 Takashi Sakamoto

use sof_ctl_protocols::*;

fn print_envelope(envelope: &BlobEnvelope) {
    println!("Envelope:");
    println!("  control ID:       {}", envelope.id);
    println!("  length:           {}", envelope.length);
}

fn print_header(header: &BlobHeader) {
    println!("Header:");
    println!(
        "  magic:            0x{:08x} ({})",
        header.magic,
        if header.magic == ABI_MAGIC { "valid" } else { "invalid" }
    );
    println!(
        "  ABI version:      {} (major {}, minor {}, patch {})",
        header.abi_version,
        header.abi_version.major(),
        header.abi_version.minor(),
        header.abi_version.patch()
    );
    println!(
        "  compatible:       {} (reference {})",
        abi_version_compatible(CORE_ABI_VERSION, header.abi_version),
        CORE_ABI_VERSION
    );
    println!("  payload size:     {}", header.size);
}

fn print_payload(payload: &[u8]) {
    println!("Payload:");
    payload.chunks(16).enumerate().for_each(|(i, line)| {
        let bytes: Vec<String> = line.iter().map(|b| format!("{:02x}", b)).collect();
        println!("  {:04x}: {}", i * 16, bytes.join(" "));
    });
}

fn parse(raw: &[u8], tlv: bool) -> Result<(), String> {
    let blob = if tlv {
        let envelope = BlobEnvelope::parse(raw)
            .ok_or_else(|| format!("{} bytes are too short for envelope", raw.len()))?;
        print_envelope(&envelope);
        let end = BlobEnvelope::SIZE + envelope.length as usize;
        if end > raw.len() {
            return Err(format!(
                "The envelope declares {} bytes, but {} bytes follow",
                envelope.length,
                raw.len() - BlobEnvelope::SIZE
            ));
        }
        &raw[BlobEnvelope::SIZE..end]
    } else {
        raw
    };

    let payload = BlobPayload::from_raw(blob.to_vec());
    let header = payload
        .header()
        .ok_or_else(|| format!("{} bytes are too short for header", blob.len()))?;
    print_header(&header);

    let data = payload.payload().ok_or_else(|| {
        format!(
            "The header declares {} bytes, but {} bytes follow",
            header.size,
            blob.len() - BlobHeader::SIZE
        )
    })?;
    print_payload(data);

    Ok(())
}

fn print_help() {
    print!(
        r###"
Usage:
  sof-blob-parser [--tlv] FILE

  where:
    --tlv: the blob is wrapped by envelope of control ID and length.
    FILE: the path to file of blob.
"###
    );
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let tlv = args.iter().any(|arg| arg == "--tlv");

    let code = args
        .iter()
        .find(|arg| !arg.starts_with("--"))
        .ok_or("At least one argument is required for path to file of blob".to_string())
        .and_then(|path| {
            std::fs::read(path).map_err(|e| format!("Fail to read file {}: {}", path, e))
        })
        .and_then(|raw| parse(&raw, tlv))
        .map(|_| 0)
        .unwrap_or_else(|msg| {
            eprintln!("{}", msg);
            print_help();
            1
        });

    std::process::exit(code)
}
