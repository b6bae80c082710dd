use crate::error::ConvertError;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Step timings of one domain
#[derive(Debug, Clone, PartialEq)]
pub struct DomainRuntime {
    pub steps: usize,
    pub total_hours: f64,
    pub mean_step_s: f64,
    /// Population standard deviation
    pub std_step_s: f64,
}

impl DomainRuntime {
    fn from_steps(steps: &[f64]) -> Self {
        let n = steps.len() as f64;
        let total: f64 = steps.iter().sum();
        let mean = total / n;
        let variance = steps.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        Self {
            steps: steps.len(),
            total_hours: total / 3600.0,
            mean_step_s: mean,
            std_step_s: variance.sqrt(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuntimeSummary {
    pub domains: BTreeMap<u32, DomainRuntime>,
}

impl RuntimeSummary {
    pub fn total_hours(&self) -> f64 {
        self.domains.values().map(|d| d.total_hours).sum()
    }
}

impl fmt::Display for RuntimeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=======================")?;
        for (domain, runtime) in &self.domains {
            writeln!(
                f,
                "Domain {} total runtime: {:.6} h (per step: {:.6}+-{:.6} s)",
                domain, runtime.total_hours, runtime.mean_step_s, runtime.std_step_s
            )?;
        }
        writeln!(f, "============")?;
        writeln!(f, "Total runtime: {:.6} h", self.total_hours())?;
        write!(f, "=======================")
    }
}

/// Collect the `Timing for main` lines of a WRF rsl log
pub fn parse_runtime_log(reader: impl BufRead) -> Result<RuntimeSummary, ConvertError> {
    let pattern = Regex::new(r"Timing for main.*domain\s*(\d+)\s*:\s*([-+0-9.eE]+)\s*elapsed")
        .map_err(|e| ConvertError::configuration(e.to_string()))?;

    let mut steps: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for line in reader.lines() {
        let line = line?;
        let Some(caps) = pattern.captures(&line) else {
            continue;
        };
        let domain = caps[1].parse::<u32>();
        let seconds = caps[2].parse::<f64>();
        match (domain, seconds) {
            (Ok(domain), Ok(seconds)) => steps.entry(domain).or_default().push(seconds),
            _ => {
                return Err(ConvertError::source_data(format!(
                    "malformed timing line: {}",
                    line.trim()
                )))
            }
        }
    }

    Ok(RuntimeSummary {
        domains: steps
            .into_iter()
            .map(|(domain, s)| (domain, DomainRuntime::from_steps(&s)))
            .collect(),
    })
}

pub fn parse_runtime_file(path: &Path) -> Result<RuntimeSummary, ConvertError> {
    let file = File::open(path).map_err(|e| {
        ConvertError::configuration(format!("cannot open {}: {}", path.display(), e))
    })?;
    parse_runtime_log(BufReader::new(file))
}
