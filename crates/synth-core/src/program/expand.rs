//! Expansión de bloques de bucle.
//!
//! Modelo plano: un bloque es una racha contigua de filas con el mismo
//! `group_id` y marca `NL`; el número de iteraciones se toma de la primera
//! fila. Los bucles anidados se rechazan con `UnsupportedNestedLoop`.
//! Contadores por encima de `MAX_LOOP_ITERATIONS`, o una expansión de más de
//! `MAX_EXPANDED_STEPS` pasos, son `MalformedStepTable`.

use serde::{Deserialize, Serialize};

use super::table::{LoopMarker, RawStep};
use crate::constants::{MAX_EXPANDED_STEPS, MAX_LOOP_ITERATIONS};
use crate::errors::CoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopContext {
    pub group_id: String,
    /// 1-based.
    pub iteration_index: u32,
    pub total_iterations: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandedStep {
    /// 1..N denso, asignado tras la expansión.
    pub sequence_number: u32,
    pub raw: RawStep,
    pub loop_context: Option<LoopContext>,
}

pub fn expand_loops(steps: &[RawStep]) -> Result<Vec<ExpandedStep>, CoreError> {
    let mut expanded: Vec<(RawStep, Option<LoopContext>)> = Vec::with_capacity(steps.len());
    let mut i = 0;
    while i < steps.len() {
        let first = &steps[i];
        let LoopMarker::Repeat { count } = first.loop_marker else {
            expanded.push((first.clone(), None));
            i += 1;
            continue;
        };
        let total = match count {
            Some(n) if n > MAX_LOOP_ITERATIONS => {
                return Err(CoreError::MalformedStepTable { line: first.line,
                                                           reason: format!("loop block '{}' repeats {n} times (max {MAX_LOOP_ITERATIONS})",
                                                                           first.group_id) })
            }
            Some(n) if n > 0 => n,
            _ => {
                return Err(CoreError::MalformedStepTable { line: first.line,
                                                           reason: format!("loop block '{}' has no iteration count", first.group_id) })
            }
        };

        let mut end = i + 1;
        while end < steps.len() && steps[end].group_id == first.group_id {
            match steps[end].loop_marker {
                LoopMarker::None => break,
                LoopMarker::Repeat { count: Some(inner) } if inner != total => {
                    return Err(CoreError::UnsupportedNestedLoop { group_id: first.group_id.clone(),
                                                                  line: steps[end].line });
                }
                LoopMarker::Repeat { .. } => end += 1,
            }
        }

        let block_len = end - i;
        if expanded.len() + block_len * total as usize > MAX_EXPANDED_STEPS {
            return Err(CoreError::MalformedStepTable { line: first.line,
                                                       reason: format!("program expands to more than {MAX_EXPANDED_STEPS} steps") });
        }
        for iteration in 1..=total {
            for step in &steps[i..end] {
                expanded.push((step.clone(),
                               Some(LoopContext { group_id: first.group_id.clone(),
                                                  iteration_index: iteration,
                                                  total_iterations: total })));
            }
        }
        i = end;
    }

    Ok(expanded.into_iter()
               .zip(1u32..)
               .map(|((raw, loop_context), sequence_number)| ExpandedStep { sequence_number,
                                                                           raw,
                                                                           loop_context })
               .collect())
}
