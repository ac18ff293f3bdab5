//! Exportación CSV del ledger de comandos.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};

use super::ledger::CommandRecord;
use crate::command::fmt_quantity;
use crate::errors::CoreError;

pub const CSV_HEADERS: [&str; 14] = ["Sequence",
                                     "Program_Step",
                                     "Composite_Function",
                                     "Atomic_Index",
                                     "Device",
                                     "Device_ID",
                                     "Command_Type",
                                     "Parameters",
                                     "Mock_Command",
                                     "Duration_Seconds",
                                     "RPM",
                                     "Direction",
                                     "Revolutions",
                                     "Comments"];

/// Metadatos de cabecera (filas tipo comentario antes de la cabecera).
#[derive(Debug, Clone, PartialEq)]
pub struct ExportMetadata {
    pub synthesis_id: String,
    pub target_scale_mmol: f64,
    pub generated_at: DateTime<Utc>,
    pub total_steps: usize,
}

fn io(e: csv::Error) -> CoreError { CoreError::Io(e.to_string()) }

fn opt(v: Option<f64>) -> String { v.map(fmt_quantity).unwrap_or_default() }

fn comments(record: &CommandRecord) -> String {
    let mut parts: Vec<String> = record.comments.iter().cloned().collect();
    if let Some(e) = &record.error {
        parts.push(format!("FAILED: {e}"));
    }
    parts.join("; ")
}

pub fn write_csv<W: Write>(writer: W, records: &[CommandRecord], metadata: Option<&ExportMetadata>) -> Result<(), CoreError> {
    let mut out = csv::WriterBuilder::new().flexible(true).from_writer(writer);
    if let Some(m) = metadata {
        out.write_record([format!("# Synthesis: {}", m.synthesis_id)]).map_err(io)?;
        out.write_record([format!("# Scale: {} mmol", fmt_quantity(m.target_scale_mmol))]).map_err(io)?;
        out.write_record([format!("# Generated: {}", m.generated_at.to_rfc3339())]).map_err(io)?;
        out.write_record([format!("# Total Steps: {}", m.total_steps)]).map_err(io)?;
        out.write_record([""]).map_err(io)?;
    }
    out.write_record(CSV_HEADERS).map_err(io)?;
    for r in records {
        let params = r.parameters.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(", ");
        out.write_record([r.sequence.to_string(),
                          r.program_step.to_string(),
                          r.function_id.clone(),
                          r.atomic_index.to_string(),
                          r.device_class.as_str().to_string(),
                          r.device_id.clone(),
                          r.command_type.clone(),
                          params,
                          r.mock_command.clone(),
                          fmt_quantity(r.estimated_duration_seconds),
                          opt(r.rpm),
                          r.direction.map(|d| d.symbol().to_string()).unwrap_or_default(),
                          opt(r.revolutions),
                          comments(r)]).map_err(io)?;
    }
    out.flush()?;
    Ok(())
}

pub fn export_csv(path: &Path, records: &[CommandRecord], metadata: Option<&ExportMetadata>) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    write_csv(File::create(path)?, records, metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{AtomicCommand, PumpMode};
    use crate::engine::core::{CommandContext, CommandEngine};

    #[test]
    fn writes_metadata_header_and_failure_notes() {
        let mut engine = CommandEngine::default();
        let cmds = [AtomicCommand::Pump { mode: PumpMode::ByVolume { volume_ml: 1.6,
                                                                     flow_rate_ml_min: 10.0 },
                                          direction: "clockwise".into() }];
        engine.execute(&cmds, &CommandContext::new(1, "METER_R1_MV"), None, true);
        let mut records = engine.ledger().records().to_vec();
        records[0].error = Some("boom".into());

        let meta = ExportMetadata { synthesis_id: "SYNTH_X".into(),
                                    target_scale_mmol: 0.1,
                                    generated_at: Utc::now(),
                                    total_steps: 1 };
        let mut buf = Vec::new();
        write_csv(&mut buf, &records, Some(&meta)).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "# Synthesis: SYNTH_X");
        assert_eq!(lines[1], "# Scale: 0.1 mmol");
        assert!(lines[5].starts_with("Sequence,Program_Step,Composite_Function"));
        assert!(lines[6].starts_with("1,1,METER_R1_MV,1,masterflex_pump,MFLEX_01,pump_volume,"));
        assert!(lines[6].contains(",12.5,+,2,"));
        assert!(lines[6].ends_with("FAILED: boom"));
    }

    #[test]
    fn without_metadata_starts_with_headers() {
        let mut buf = Vec::new();
        write_csv(&mut buf, &[], None).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap().trim_end(), CSV_HEADERS.join(","));
    }
}
