use super::pipeline::StillResult;

/// How the detected classes read for the person looking at the leaf.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeafVerdict {
    /// Only the healthy class was found.
    Healthy,
    /// Disease classes plus the healthy class. The overlap may be a model
    /// artefact rather than a real finding, so it is surfaced as a warning.
    DiseasedWithHealthy { diseases: Vec<String> },
    Diseased { diseases: Vec<String> },
    NoneAboveThreshold,
}

pub const AMBIGUITY_WARNING: &str =
    "Perhatian: 'Daun sehat' juga terdeteksi, mungkin ada ambiguitas atau tumpang tindih.";

impl LeafVerdict {
    pub fn from_result(result: &StillResult, healthy_class: &str) -> Self {
        let unique = result.unique_class_names();
        if unique.is_empty() {
            return LeafVerdict::NoneAboveThreshold;
        }
        let has_healthy = unique.iter().any(|n| n == healthy_class);
        let diseases: Vec<String> = unique.into_iter().filter(|n| n != healthy_class).collect();
        match (has_healthy, diseases.is_empty()) {
            (true, true) => LeafVerdict::Healthy,
            (true, false) => LeafVerdict::DiseasedWithHealthy { diseases },
            (false, _) => LeafVerdict::Diseased { diseases },
        }
    }

    pub fn headline(&self) -> String {
        match self {
            LeafVerdict::Healthy => "Daun melon terlihat Sehat".to_string(),
            LeafVerdict::DiseasedWithHealthy { diseases } | LeafVerdict::Diseased { diseases } => {
                format!("Penyakit Terdeteksi: {}", diseases.join(", "))
            }
            LeafVerdict::NoneAboveThreshold => {
                "Tidak ada deteksi yang valid atau dikenali dengan ambang batas saat ini.".to_string()
            }
        }
    }

    pub fn warning(&self) -> Option<&'static str> {
        match self {
            LeafVerdict::DiseasedWithHealthy { .. } => Some(AMBIGUITY_WARNING),
            _ => None,
        }
    }
}
