use crate::domain::Address;
use crate::error::{GeofullError, Result};

/// Column order for the export file. Enrichment results sit next to the
/// raw input so exported sheets read left to right.
pub const EXPORT_COLUMNS: [&str; 14] = [
    "id",
    "original_address",
    "normalized_address",
    "suggested_address",
    "latitude",
    "longitude",
    "postal_code",
    "street_info",
    "neighborhood",
    "apartment_info",
    "notes",
    "status",
    "created_at",
    "updated_at",
];

/// Header names accepted for the raw-address column, in priority order.
const ADDRESS_COLUMN_CANDIDATES: [&str; 3] = ["direccion", "address", "dirección"];

/// Raw addresses pulled out of one uploaded CSV document
#[derive(Debug, Clone)]
pub struct CsvAddresses {
    pub rows_found: usize,
    pub addresses: Vec<String>,
}

/// Minimal CSV reader: quoted fields, doubled-quote escapes, CR/LF and LF
/// line endings. Rows are not forced to a uniform width.
pub fn parse(text: &str) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }

    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows
}

/// Find the raw-address column in a header row, if any.
pub fn detect_address_column(header: &[String]) -> Option<usize> {
    for candidate in ADDRESS_COLUMN_CANDIDATES {
        let found = header
            .iter()
            .position(|name| name.trim().to_lowercase() == candidate);
        if found.is_some() {
            return found;
        }
    }
    None
}

/// Pull the non-blank raw addresses out of a CSV document.
pub fn extract_addresses(text: &str) -> Result<CsvAddresses> {
    let rows = parse(text);
    let Some((header, data)) = rows.split_first() else {
        return Err(GeofullError::Csv("the file is empty".to_string()));
    };

    let column = detect_address_column(header).ok_or_else(|| {
        GeofullError::Csv(
            "the file must contain a column named 'direccion' or 'address'".to_string(),
        )
    })?;

    let mut addresses = Vec::new();
    for row in data {
        let Some(value) = row.get(column) else {
            continue;
        };
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            addresses.push(trimmed.to_string());
        }
    }

    Ok(CsvAddresses {
        rows_found: data.len(),
        addresses,
    })
}

fn escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn opt_text(field: &Option<String>) -> String {
    field.clone().unwrap_or_default()
}

/// Render all records as a CSV document in `EXPORT_COLUMNS` order.
pub fn render(addresses: &[Address]) -> String {
    let mut out = String::new();
    out.push_str(&EXPORT_COLUMNS.join(","));
    out.push('\n');

    for address in addresses {
        let fields = [
            address.id.to_string(),
            address.original_address.clone(),
            opt_text(&address.normalized_address),
            opt_text(&address.suggested_address),
            address.latitude.map(|v| v.to_string()).unwrap_or_default(),
            address.longitude.map(|v| v.to_string()).unwrap_or_default(),
            opt_text(&address.postal_code),
            opt_text(&address.street_info),
            opt_text(&address.neighborhood),
            opt_text(&address.apartment_info),
            opt_text(&address.notes),
            address.status.as_str().to_string(),
            address.created_at.to_rfc3339(),
            address
                .updated_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
        ];

        let line: Vec<String> = fields.iter().map(|f| escape(f)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }

    out
}
