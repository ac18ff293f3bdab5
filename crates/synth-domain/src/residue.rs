//! Tablas de residuos: aminoácidos canónicos, reactivos Fmoc, residuos
//! difíciles y el mapa puerto -> reactivo del sintetizador.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AminoAcid {
    pub code: char,
    pub three_letter: &'static str,
    pub full_name: &'static str,
    /// Protección de cadena lateral estándar (Fmoc/tBu).
    pub side_chain: Option<&'static str>,
}

impl AminoAcid {
    const fn new(code: char, three_letter: &'static str, full_name: &'static str, side_chain: Option<&'static str>) -> Self {
        Self { code,
               three_letter,
               full_name,
               side_chain }
    }

    pub fn fmoc_reagent(&self) -> String {
        match self.side_chain {
            Some(p) => format!("Fmoc-{}({p})", self.code),
            None => format!("Fmoc-{}", self.code),
        }
    }
}

static CANONICAL: Lazy<BTreeMap<char, AminoAcid>> = Lazy::new(|| {
    [AminoAcid::new('A', "Ala", "Alanine", None),
     AminoAcid::new('R', "Arg", "Arginine", Some("Pbf")),
     AminoAcid::new('N', "Asn", "Asparagine", Some("Trt")),
     AminoAcid::new('D', "Asp", "Aspartic acid", Some("OtBu")),
     AminoAcid::new('C', "Cys", "Cysteine", Some("Trt")),
     AminoAcid::new('E', "Glu", "Glutamic acid", Some("OtBu")),
     AminoAcid::new('Q', "Gln", "Glutamine", Some("Trt")),
     AminoAcid::new('G', "Gly", "Glycine", None),
     AminoAcid::new('H', "His", "Histidine", Some("Trt")),
     AminoAcid::new('I', "Ile", "Isoleucine", None),
     AminoAcid::new('L', "Leu", "Leucine", None),
     AminoAcid::new('K', "Lys", "Lysine", Some("Boc")),
     AminoAcid::new('M', "Met", "Methionine", None),
     AminoAcid::new('F', "Phe", "Phenylalanine", None),
     AminoAcid::new('P', "Pro", "Proline", None),
     AminoAcid::new('S', "Ser", "Serine", Some("tBu")),
     AminoAcid::new('T', "Thr", "Threonine", Some("tBu")),
     AminoAcid::new('W', "Trp", "Tryptophan", Some("Boc")),
     AminoAcid::new('Y', "Tyr", "Tyrosine", Some("tBu")),
     AminoAcid::new('V', "Val", "Valine", None)].into_iter()
                                                .map(|aa| (aa.code, aa))
                                                .collect()
});

/// Residuos con acoplamiento lento (Pro, Gly, Ile, Val).
pub const DIFFICULT_RESIDUES: [char; 4] = ['P', 'G', 'I', 'V'];

pub fn canonical(code: char) -> Option<&'static AminoAcid> { CANONICAL.get(&code.to_ascii_uppercase()) }

pub fn canonical_codes() -> impl Iterator<Item = char> { CANONICAL.keys().copied() }

/// Nombre del reactivo Fmoc; códigos desconocidos caen en `Fmoc-{code}`.
pub fn fmoc_reagent_name(code: &str) -> String {
    let mut chars = code.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => canonical(c).map(AminoAcid::fmoc_reagent).unwrap_or_else(|| format!("Fmoc-{code}")),
        _ => format!("Fmoc-{code}"),
    }
}

pub fn is_difficult(code: &str) -> bool {
    let mut chars = code.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if DIFFICULT_RESIDUES.contains(&c.to_ascii_uppercase()))
}

/// Reactivo cargado en cada puerto del selector.
pub fn port_reagent(port: &str, residue_code: Option<&str>) -> String {
    match port.trim().to_ascii_uppercase().as_str() {
        "R1" => format!("Fmoc-{}", residue_code.unwrap_or("AA")),
        "R2" => "Activator".to_string(),
        "R3" => "Deprotection".to_string(),
        "R4" => "DMF".to_string(),
        "R5" => "Reactor".to_string(),
        "R6" => "Waste".to_string(),
        other => format!("Port_{other}"),
    }
}
