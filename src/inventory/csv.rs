// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// src/inventory/csv.rs - Fixed-schema CSV interchange for the fleet store

use chrono::{DateTime, Utc};
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

use super::{Inventory, InventoryResult, XNode, XNodeStatus};

const CSV_HEADER: &str = "id,name,provider,status,ip_address,region,deployed_at,cost_hourly,tags";

impl Inventory {
    /// Write every entry as one row of the fixed column schema. String
    /// fields are quoted when they carry a comma or quote, and the tag
    /// list is always comma-joined inside a quoted field, so entries
    /// like a name of "edge, primary" survive the round trip.
    pub fn export_csv(&self, path: impl AsRef<Path>) -> InventoryResult<()> {
        let file = fs::File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);

        writeln!(writer, "{CSV_HEADER}")?;
        for xnode in self.list_all() {
            writeln!(
                writer,
                "{},{},{},{},{},{},{},{:.4},\"{}\"",
                quote_field(&xnode.id),
                quote_field(&xnode.name),
                quote_field(&xnode.provider),
                xnode.status,
                quote_field(&xnode.ip_address),
                quote_field(xnode.region.as_deref().unwrap_or("")),
                xnode.deployed_at.to_rfc3339(),
                xnode.cost_hourly,
                xnode.tags.join(",").replace('"', "\"\"")
            )?;
        }
        writer.flush()?;

        info!(path = %path.as_ref().display(), rows = self.len(), "inventory exported");
        Ok(())
    }

    /// Import rows, skipping ids already present. Returns the number of
    /// entries actually added. Missing or bad timestamps default to now,
    /// bad prices to zero; structurally short rows are skipped with a
    /// warning rather than failing the whole import.
    pub fn import_csv(&mut self, path: impl AsRef<Path>) -> InventoryResult<usize> {
        let file = fs::File::open(path.as_ref())?;
        let reader = BufReader::new(file);

        let mut imported = 0;
        for (line_no, line) in reader.lines().enumerate().skip(1) {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let fields = split_csv_line(&line);
            if fields.len() < 8 {
                warn!(row = line_no, "skipping short CSV row");
                continue;
            }

            let id = fields[0].clone();
            if self.get_xnode(&id).is_some() {
                continue;
            }

            let status = fields[3]
                .parse::<XNodeStatus>()
                .unwrap_or(XNodeStatus::Stopped);
            let deployed_at = DateTime::parse_from_rfc3339(&fields[6])
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());
            let cost_hourly = fields[7].parse::<f64>().unwrap_or(0.0);
            let tags: Vec<String> = fields
                .get(8)
                .map(|raw| {
                    raw.split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect()
                })
                .unwrap_or_default();

            let mut xnode = XNode::new(id, fields[1].clone(), status, fields[4].clone());
            xnode.created_at = deployed_at;
            if !fields[5].is_empty() {
                xnode.region = Some(fields[5].clone());
            }

            self.add_xnode(&xnode, fields[2].clone(), "imported".to_string(), cost_hourly, tags)?;
            imported += 1;
        }

        info!(path = %path.as_ref().display(), imported, "inventory import complete");
        Ok(imported)
    }
}

/// Quote a field only when it would break the column layout, doubling
/// embedded quotes per the usual CSV convention.
fn quote_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split one CSV line on commas, honoring double-quoted fields with `""`
/// escapes. Only as general as our own export format needs.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
