//! Output checking: the JSON Schema for the unified output, and the wire
//! invariants a call set must satisfy before it is written.

use schemars::schema_for;

use super::types::{SvCall, UnifiedOutput};
use crate::sv::SvType;

/// The JSON Schema for `UnifiedOutput`, pretty-printed.
pub fn schema_json_pretty() -> String {
    serde_json::to_string_pretty(&schema_for!(UnifiedOutput))
        .expect("schema serialization should not fail")
}

/// Check an assembled output before writing: structural validation against
/// the schema, then the per-call wire invariants. Returns the first
/// violation found.
pub fn check_output(output: &UnifiedOutput) -> Result<(), String> {
    let value = serde_json::to_value(output).map_err(|e| e.to_string())?;
    let schema = serde_json::to_value(schema_for!(UnifiedOutput)).map_err(|e| e.to_string())?;
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| format!("schema failed to compile: {}", e))?;
    if let Some(error) = validator.iter_errors(&value).next() {
        return Err(format!("schema mismatch at {}: {}", error.instance_path, error));
    }

    if let Some(calls) = &output.calls {
        for call in calls {
            check_call(call)?;
        }
    }
    Ok(())
}

/// Wire invariants of one emitted call: inward-convention orientations,
/// ordered anchors on one chromosome, positive sizes where the emission
/// gates promise them, and CTX cross-referencing.
fn check_call(call: &SvCall) -> Result<(), String> {
    for strand in [call.strand1, call.strand2] {
        if strand != '+' && strand != '-' {
            return Err(format!("{}: orientation '{}' is not +/-", call.name, strand));
        }
    }
    if call.is_intra() && call.anchor1 > call.anchor2 {
        return Err(format!(
            "{}: anchors out of order ({} > {})",
            call.name, call.anchor1, call.anchor2
        ));
    }
    if matches!(call.sv_type, SvType::Ins | SvType::Del | SvType::Itx) && call.size == 0 {
        return Err(format!("{}: zero-sized {} call", call.name, call.sv_type));
    }
    if call.sv_type == SvType::Ctx {
        if call.ctx_mate.is_none() {
            return Err(format!("{}: CTX record without mate coordinates", call.name));
        }
        if !call.name.ends_with("_1") && !call.name.ends_with("_2") {
            return Err(format!("{}: CTX record outside a _1/_2 pair", call.name));
        }
    } else if call.ctx_mate.is_some() {
        return Err(format!("{}: mate coordinates on a non-CTX record", call.name));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputCollector;
    use serde_json::Value;

    fn del_call() -> SvCall {
        SvCall {
            name: "SV_1".to_string(),
            sv_type: SvType::Del,
            chrom1: "chr1".to_string(),
            start1: 100_000,
            end1: 100_100,
            strand1: '+',
            chrom2: "chr1".to_string(),
            start2: 110_000,
            end2: 110_100,
            strand2: '-',
            anchor1: 100_100,
            anchor2: 110_000,
            size: 5_000,
            count: 10,
            merged: false,
            ctx_mate: None,
        }
    }

    #[test]
    fn test_check_accepts_collector_output() {
        let output = OutputCollector::new("sample.bam").with_calls(vec![del_call()]).build();
        assert!(check_output(&output).is_ok());
    }

    #[test]
    fn test_check_rejects_inverted_anchors() {
        let mut call = del_call();
        call.anchor1 = 110_000;
        call.anchor2 = 100_100;
        let err = check_call(&call).unwrap_err();
        assert!(err.contains("anchors out of order"));
    }

    #[test]
    fn test_check_rejects_bad_orientation() {
        let mut call = del_call();
        call.strand2 = '.';
        assert!(check_call(&call).is_err());
    }

    #[test]
    fn test_check_rejects_zero_sized_indel() {
        let mut call = del_call();
        call.size = 0;
        assert!(check_call(&call).is_err());
    }

    #[test]
    fn test_check_enforces_ctx_cross_reference() {
        let mut call = del_call();
        call.sv_type = SvType::Ctx;
        call.chrom2 = "chr7".to_string();
        // a CTX record must carry mate coordinates and a pair suffix
        assert!(check_call(&call).is_err());
        call.ctx_mate = Some("chr7:110000-110100".to_string());
        assert!(check_call(&call).is_err());
        call.name = "SV_1_1".to_string();
        assert!(check_call(&call).is_ok());

        // and a non-CTX record must not
        let mut call = del_call();
        call.ctx_mate = Some("chr7:110000-110100".to_string());
        assert!(check_call(&call).is_err());
    }

    #[test]
    fn test_schema_is_valid_json() {
        let schema = schema_json_pretty();
        let parsed: Value = serde_json::from_str(&schema).unwrap();
        assert!(parsed.get("title").is_some() || parsed.get("$schema").is_some());
    }
}
