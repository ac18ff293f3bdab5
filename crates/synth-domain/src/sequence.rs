//! Secuencia peptídica parseada.
//!
//! Formatos aceptados: `FMRF`, `FMRF-NH2`, `Ac-YGGFL-NH2`, `H-DRVYIHPF-OH`.
//! Además de los 20 códigos canónicos se admiten protecciones a medida
//! (`K*`, `K**`) y bloques de construcción entre corchetes (`[Aib]`).
//! La secuencia se escribe N -> C; `synthesis_order` la recorre C -> N.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::residue::{canonical, fmoc_reagent_name};
use crate::DomainError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Residue {
    /// Posición 1-based tal como está escrita (N -> C).
    pub position: usize,
    pub code: String,
    pub three_letter: Option<String>,
    pub full_name: Option<String>,
    pub reagent: String,
    pub n_terminal: bool,
    pub c_terminal: bool,
    pub building_block: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedSequence {
    /// Secuencia núcleo, sin modificaciones terminales.
    pub sequence: String,
    pub residues: Vec<Residue>,
    pub n_terminal_mod: Option<String>,
    pub c_terminal_mod: Option<String>,
}

impl ParsedSequence {
    pub fn parse(input: &str) -> Result<Self, DomainError> {
        let mut rest = input.trim().to_ascii_uppercase();
        if rest.is_empty() {
            return Err(DomainError::InvalidSequence { position: 0,
                                                      reason: "empty sequence".into() });
        }

        let mut n_terminal_mod = None;
        if let Some(r) = rest.strip_prefix("AC-") {
            n_terminal_mod = Some("Acetyl".to_string());
            rest = r.to_string();
        } else if let Some(r) = rest.strip_prefix("H-") {
            n_terminal_mod = Some("Free".to_string());
            rest = r.to_string();
        }

        let mut c_terminal_mod = None;
        if let Some(r) = rest.strip_suffix("-NH2") {
            c_terminal_mod = Some("Amide".to_string());
            rest = r.to_string();
        } else if let Some(r) = rest.strip_suffix("-OH") {
            c_terminal_mod = Some("Free".to_string());
            rest = r.to_string();
        }

        let mut residues = parse_core(&rest)?;
        if residues.is_empty() {
            return Err(DomainError::InvalidSequence { position: 0,
                                                      reason: "no residues".into() });
        }
        if let Some(first) = residues.first_mut() {
            first.n_terminal = true;
        }
        if let Some(last) = residues.last_mut() {
            last.c_terminal = true;
        }
        log::debug!("parsed sequence {rest} ({} residues)", residues.len());

        Ok(Self { sequence: rest,
                  residues,
                  n_terminal_mod,
                  c_terminal_mod })
    }

    /// Construye una secuencia a partir de códigos ya validados en otra parte
    /// (p. ej. un parser externo); no consulta la tabla canónica.
    pub fn from_codes<I, S>(codes: I) -> Self
        where I: IntoIterator<Item = S>,
              S: Into<String>
    {
        let mut residues: Vec<Residue> = codes.into_iter()
                                              .enumerate()
                                              .map(|(i, code)| {
                                                  let code = code.into();
                                                  let aa = code.chars().next().filter(|_| code.chars().count() == 1).and_then(canonical);
                                                  Residue { position: i + 1,
                                                            reagent: fmoc_reagent_name(&code),
                                                            three_letter: aa.map(|a| a.three_letter.to_string()),
                                                            full_name: aa.map(|a| a.full_name.to_string()),
                                                            code,
                                                            n_terminal: false,
                                                            c_terminal: false,
                                                            building_block: false }
                                              })
                                              .collect();
        if let Some(first) = residues.first_mut() {
            first.n_terminal = true;
        }
        if let Some(last) = residues.last_mut() {
            last.c_terminal = true;
        }
        let sequence = residues.iter().map(|r| r.code.as_str()).collect();
        Self { sequence,
               residues,
               n_terminal_mod: None,
               c_terminal_mod: None }
    }

    pub fn len(&self) -> usize { self.residues.len() }

    pub fn is_empty(&self) -> bool { self.residues.is_empty() }

    pub fn codes(&self) -> Vec<&str> { self.residues.iter().map(|r| r.code.as_str()).collect() }

    /// Orden SPPS: del C-terminal al N-terminal.
    pub fn synthesis_order(&self) -> impl Iterator<Item = &Residue> { self.residues.iter().rev() }
}

impl fmt::Display for ParsedSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(n) = &self.n_terminal_mod {
            write!(f, "{n}-")?;
        }
        write!(f, "{}", self.sequence)?;
        if let Some(c) = &self.c_terminal_mod {
            write!(f, "-{c}")?;
        }
        Ok(())
    }
}

fn parse_core(sequence: &str) -> Result<Vec<Residue>, DomainError> {
    let chars: Vec<char> = sequence.chars().collect();
    let mut residues = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let position = residues.len() + 1;
        if chars[i] == '[' {
            let Some(end) = chars[i..].iter().position(|&c| c == ']').map(|p| p + i) else {
                return Err(DomainError::InvalidSequence { position: i,
                                                          reason: "unclosed bracket".into() });
            };
            let name: String = chars[i + 1..end].iter().collect();
            if name.is_empty() {
                return Err(DomainError::InvalidSequence { position: i,
                                                          reason: "empty building block".into() });
            }
            residues.push(Residue { position,
                                    reagent: fmoc_reagent_name(&name),
                                    code: name,
                                    three_letter: None,
                                    full_name: None,
                                    n_terminal: false,
                                    c_terminal: false,
                                    building_block: true });
            i = end + 1;
            continue;
        }

        let Some(aa) = canonical(chars[i]) else {
            return Err(DomainError::InvalidSequence { position: i,
                                                      reason: format!("unknown amino acid code '{}'", chars[i]) });
        };
        let stars = chars[i + 1..].iter().take_while(|&&c| c == '*').count();
        let code = format!("{}{}", aa.code, "*".repeat(stars));
        residues.push(Residue { position,
                                reagent: if stars == 0 { aa.fmoc_reagent() } else { fmoc_reagent_name(&code) },
                                code,
                                three_letter: Some(aa.three_letter.to_string()),
                                full_name: Some(aa.full_name.to_string()),
                                n_terminal: false,
                                c_terminal: false,
                                building_block: false });
        i += 1 + stars;
    }
    Ok(residues)
}
