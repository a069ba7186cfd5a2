//! List and detail rendering shared by every record family
//!
//! Lists go through [`Row`]: the human table uses tabled, CSV uses the csv
//! writer, and JSON/YAML serialize the full records. Details are always the
//! full record.

use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::{format_limits, opt, truncate_str};
use crate::cli::OutputFormat;
use crate::core::entity::Entity;
use crate::entities::{
    AuditFinding, AuditPlan, Capa, CorrectiveAction, Inspection, InspectionResult, Ncr,
    NonConformance, PreventiveAction, QcParameter, QcTemplate,
};

const TITLE_WIDTH: usize = 32;

/// Columns shown for a record in list output, after its ID
pub trait Row: Entity {
    const HEADERS: &'static [&'static str];

    fn cells(&self) -> Vec<String>;
}

fn header_row<R: Row>() -> Vec<String> {
    std::iter::once("ID")
        .chain(R::HEADERS.iter().copied())
        .map(str::to_string)
        .collect()
}

fn record_row<R: Row>(record: &R) -> Vec<String> {
    std::iter::once(record.id().to_string())
        .chain(record.cells())
        .collect()
}

/// Render a list in the requested format (`auto` is an aligned table)
pub fn print_list<R: Row>(records: &[R], format: OutputFormat, quiet: bool) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(records).into_diagnostic()?);
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(records).into_diagnostic()?);
        }
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(std::io::stdout());
            writer.write_record(header_row::<R>()).into_diagnostic()?;
            for record in records {
                writer.write_record(record_row(record)).into_diagnostic()?;
            }
            writer.flush().into_diagnostic()?;
        }
        OutputFormat::Tsv => {
            println!("{}", header_row::<R>().join("\t"));
            for record in records {
                println!("{}", record_row(record).join("\t"));
            }
        }
        OutputFormat::Id => {
            for record in records {
                println!("{}", record.id());
            }
        }
        OutputFormat::Md | OutputFormat::Auto => {
            if records.is_empty() {
                if !quiet {
                    println!("No {} records found.", R::PREFIX.family());
                }
                return Ok(());
            }
            let mut builder = Builder::default();
            builder.push_record(header_row::<R>());
            for record in records {
                builder.push_record(record_row(record));
            }
            let mut table = builder.build();
            if format == OutputFormat::Md {
                table.with(Style::markdown());
            } else {
                table.with(Style::blank());
            }
            println!("{}", table);
            if !quiet && format == OutputFormat::Auto {
                println!();
                println!(
                    "{} {} record(s) found.",
                    style(records.len()).cyan(),
                    R::PREFIX.family()
                );
            }
        }
    }
    Ok(())
}

/// Render one value in full (`auto` is YAML)
pub fn print_detail<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
        }
        _ => print!("{}", serde_yml::to_string(value).into_diagnostic()?),
    }
    Ok(())
}

/// Render a name/value summary table, or the value itself for machine formats
pub fn print_summary<T: Serialize>(title: &str, rows: &[(&str, String)], value: &T, format: OutputFormat) -> Result<()> {
    let rows: Vec<Vec<String>> = rows
        .iter()
        .map(|(name, value)| vec![name.to_string(), value.clone()])
        .collect();
    print_table(Some(title), &["Metric", "Value"], rows, value, format)
}

/// Render rows that are not records themselves (e.g. nested lists)
pub fn print_table<T: Serialize>(
    title: Option<&str>,
    headers: &[&str],
    rows: Vec<Vec<String>>,
    value: &T,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Auto | OutputFormat::Md | OutputFormat::Tsv => {
            let mut builder = Builder::default();
            builder.push_record(headers.iter().copied());
            for row in rows {
                builder.push_record(row);
            }
            let mut table = builder.build();
            if format == OutputFormat::Md {
                table.with(Style::markdown());
            } else {
                table.with(Style::rounded());
            }
            if let Some(title) = title {
                println!("{}", style(title).bold());
            }
            println!("{}", table);
            Ok(())
        }
        _ => print_detail(value, format),
    }
}

impl Row for Ncr {
    const HEADERS: &'static [&'static str] = &["NUMBER", "TITLE", "SEVERITY", "CATEGORY", "STATUS", "CAPA"];

    fn cells(&self) -> Vec<String> {
        vec![
            self.ncr_number.clone(),
            truncate_str(&self.title, TITLE_WIDTH),
            self.severity.to_string(),
            self.category.to_string(),
            self.status.to_string(),
            opt(self.capa.label()),
        ]
    }
}

impl Row for NonConformance {
    const HEADERS: &'static [&'static str] = &["NUMBER", "TITLE", "SEVERITY", "PRIORITY", "STATUS", "CAPA"];

    fn cells(&self) -> Vec<String> {
        vec![
            self.nc_number.clone(),
            truncate_str(&self.title, TITLE_WIDTH),
            self.severity.to_string(),
            self.priority.to_string(),
            self.status.to_string(),
            opt(self.capa.label()),
        ]
    }
}

impl Row for Capa {
    const HEADERS: &'static [&'static str] = &["NUMBER", "TITLE", "TYPE", "PRIORITY", "STATUS", "OWNER"];

    fn cells(&self) -> Vec<String> {
        vec![
            self.capa_number.clone(),
            truncate_str(&self.title, TITLE_WIDTH),
            self.capa_type.to_string(),
            self.priority.to_string(),
            self.status.to_string(),
            opt(self.owner.as_ref()),
        ]
    }
}

impl Row for CorrectiveAction {
    const HEADERS: &'static [&'static str] = &["NUMBER", "TITLE", "PRIORITY", "STATUS", "OWNER", "CAPA"];

    fn cells(&self) -> Vec<String> {
        vec![
            self.ca_number.clone(),
            truncate_str(&self.title, TITLE_WIDTH),
            self.priority.to_string(),
            self.status.to_string(),
            opt(self.owner.as_ref()),
            opt(self.capa.label()),
        ]
    }
}

impl Row for PreventiveAction {
    const HEADERS: &'static [&'static str] = &["NUMBER", "TITLE", "PRIORITY", "STATUS", "OWNER", "CAPA"];

    fn cells(&self) -> Vec<String> {
        vec![
            self.pa_number.clone(),
            truncate_str(&self.title, TITLE_WIDTH),
            self.priority.to_string(),
            self.status.to_string(),
            opt(self.owner.as_ref()),
            opt(self.capa.label()),
        ]
    }
}

impl Row for AuditPlan {
    const HEADERS: &'static [&'static str] = &["NUMBER", "TITLE", "TYPE", "START", "END", "STATUS"];

    fn cells(&self) -> Vec<String> {
        vec![
            self.audit_number.clone(),
            truncate_str(&self.title, TITLE_WIDTH),
            self.audit_type.to_string(),
            opt(self.planned_start),
            opt(self.planned_end),
            self.status.to_string(),
        ]
    }
}

impl Row for AuditFinding {
    const HEADERS: &'static [&'static str] = &["NUMBER", "TITLE", "TYPE", "SEVERITY", "STATUS", "AUDIT"];

    fn cells(&self) -> Vec<String> {
        vec![
            self.finding_number.clone(),
            truncate_str(&self.title, TITLE_WIDTH),
            self.finding_type.to_string(),
            self.severity.to_string(),
            self.status.to_string(),
            opt(self.audit_plan.label()),
        ]
    }
}

impl Row for Inspection {
    const HEADERS: &'static [&'static str] = &["NUMBER", "TITLE", "TYPE", "LOT", "STATUS", "RESULT"];

    fn cells(&self) -> Vec<String> {
        vec![
            self.inspection_number.clone(),
            truncate_str(&self.title, TITLE_WIDTH),
            self.inspection_type.to_string(),
            opt(self.lot_number.as_ref()),
            self.status.to_string(),
            self.overall_result.to_string(),
        ]
    }
}

impl Row for InspectionResult {
    const HEADERS: &'static [&'static str] = &["SEQ", "PARAMETER", "VALUE", "LIMITS", "DEVIATION", "STATUS"];

    fn cells(&self) -> Vec<String> {
        let value = match (self.numeric_value, &self.text_value) {
            (Some(v), _) => match &self.unit {
                Some(unit) => format!("{} {}", v, unit),
                None => v.to_string(),
            },
            (None, Some(text)) => truncate_str(text, 16),
            (None, None) => String::new(),
        };
        vec![
            self.sequence.to_string(),
            truncate_str(&self.parameter_name, TITLE_WIDTH),
            value,
            format_limits(self.lower_limit, self.upper_limit),
            opt(self.deviation),
            self.status.to_string(),
        ]
    }
}

impl Row for QcTemplate {
    const HEADERS: &'static [&'static str] = &["CODE", "VERSION", "TITLE", "TYPE", "STATUS"];

    fn cells(&self) -> Vec<String> {
        vec![
            self.code.clone(),
            self.version.to_string(),
            truncate_str(&self.title, TITLE_WIDTH),
            self.inspection_type.to_string(),
            self.status.to_string(),
        ]
    }
}

impl Row for QcParameter {
    const HEADERS: &'static [&'static str] = &["SEQ", "NAME", "KIND", "TARGET", "LIMITS", "CRITICALITY"];

    fn cells(&self) -> Vec<String> {
        vec![
            self.sequence.to_string(),
            truncate_str(&self.name, TITLE_WIDTH),
            self.kind.to_string(),
            opt(self.target),
            format_limits(self.lower_limit, self.upper_limit),
            self.criticality.to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::Severity;
    use crate::core::identity::{EntityId, EntityPrefix};

    #[test]
    fn test_row_width_matches_headers() {
        let ncr = Ncr::new("Scratched housing on the A-side cover plate", Severity::Major, "t");
        assert_eq!(ncr.cells().len(), Ncr::HEADERS.len());
        assert_eq!(record_row(&ncr).len(), header_row::<Ncr>().len());
        assert!(ncr.cells()[1].ends_with("..."));

        let mut result = InspectionResult::new(EntityId::new(EntityPrefix::Insp), 1, "Bore", "t");
        result.numeric_value = Some(10.02);
        result.unit = Some("mm".to_string());
        result.lower_limit = Some(9.95);
        result.upper_limit = Some(10.05);
        let cells = result.cells();
        assert_eq!(cells.len(), InspectionResult::HEADERS.len());
        assert_eq!(cells[2], "10.02 mm");
        assert_eq!(cells[3], "9.95..10.05");
    }
}
