use crate::error::Result;
use crate::schema::{
    FinancialCloseRecord, ProcessEfficiencyRecord, RecordSet, ALL_DEPARTMENTS, ALL_REGIONS,
};
use crate::utils::{months_before, parse_record_date};
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};

pub const DEFAULT_WINDOW_MONTHS: u32 = 36;

/// A multi-select with an "everything" sentinel.
///
/// No specific values means the sentinel is selected, so the selection can
/// never be empty and the sentinel never coexists with a specific value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawSelection")]
pub struct Selection {
    sentinel: String,
    values: Vec<String>,
}

#[derive(Deserialize)]
struct RawSelection {
    sentinel: String,
    #[serde(default)]
    values: Vec<String>,
}

impl From<RawSelection> for Selection {
    fn from(raw: RawSelection) -> Self {
        Selection::from_values(raw.sentinel, raw.values)
    }
}

impl Selection {
    pub fn all(sentinel: impl Into<String>) -> Self {
        Self {
            sentinel: sentinel.into(),
            values: Vec::new(),
        }
    }

    pub fn all_regions() -> Self {
        Self::all(ALL_REGIONS)
    }

    pub fn all_departments() -> Self {
        Self::all(ALL_DEPARTMENTS)
    }

    /// Builds a selection from raw UI values. The sentinel anywhere in the
    /// list wins; duplicates are dropped.
    pub fn from_values<I, S>(sentinel: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut selection = Self::all(sentinel);
        for value in values {
            let value = value.into();
            if value == selection.sentinel {
                selection.values.clear();
                return selection;
            }
            if !selection.values.contains(&value) {
                selection.values.push(value);
            }
        }
        selection
    }

    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    pub fn is_all(&self) -> bool {
        self.values.is_empty()
    }

    /// Selected values; `[sentinel]` when unconstrained.
    pub fn values(&self) -> Vec<&str> {
        if self.values.is_empty() {
            vec![self.sentinel.as_str()]
        } else {
            self.values.iter().map(String::as_str).collect()
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        self.is_all() || self.values.iter().any(|v| v == value)
    }

    pub fn select_all(&mut self) {
        self.values.clear();
    }

    /// Picking the sentinel resets to "all"; picking a value flips its membership.
    pub fn toggle(&mut self, value: &str) {
        if value == self.sentinel {
            self.select_all();
        } else if let Some(pos) = self.values.iter().position(|v| v == value) {
            self.values.remove(pos);
        } else {
            self.values.push(value.to_string());
        }
    }

    pub fn remove(&mut self, value: &str) {
        self.values.retain(|v| v != value);
    }

    pub fn label(&self) -> String {
        match self.values.len() {
            0 => self.sentinel.clone(),
            1 => self.values[0].clone(),
            n => format!("{} selected", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub regions: Selection,
    pub departments: Selection,
}

impl FilterCriteria {
    /// Trailing window of `months` ending at `today`, nothing else constrained.
    pub fn default_for(today: NaiveDate, months: u32) -> Result<Self> {
        Ok(Self {
            date_from: months_before(today, months)?,
            date_to: today,
            regions: Selection::all_regions(),
            departments: Selection::all_departments(),
        })
    }

    pub fn reset(&mut self, today: NaiveDate, months: u32) -> Result<()> {
        *self = Self::default_for(today, months)?;
        Ok(())
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.date_from <= date && date <= self.date_to
    }

    pub fn matches_financial(&self, record: &FinancialCloseRecord, today: NaiveDate) -> bool {
        let date = resolve_date(&record.period, &record.id, today);
        self.contains_date(date)
            && self.regions.matches(&record.region)
            && self.departments.matches(&record.department)
    }

    /// Process observations carry no region, so only the window applies.
    pub fn matches_process(&self, record: &ProcessEfficiencyRecord, today: NaiveDate) -> bool {
        self.contains_date(resolve_date(&record.date, &record.id, today))
    }

    pub fn filter_financial(
        &self,
        records: &[FinancialCloseRecord],
        today: NaiveDate,
    ) -> Vec<FinancialCloseRecord> {
        records
            .iter()
            .filter(|r| self.matches_financial(r, today))
            .cloned()
            .collect()
    }

    pub fn filter_process(
        &self,
        records: &[ProcessEfficiencyRecord],
        today: NaiveDate,
    ) -> Vec<ProcessEfficiencyRecord> {
        records
            .iter()
            .filter(|r| self.matches_process(r, today))
            .cloned()
            .collect()
    }

    pub fn apply(&self, records: &RecordSet, today: NaiveDate) -> RecordSet {
        RecordSet::new(
            self.filter_financial(&records.financial, today),
            self.filter_process(&records.process, today),
        )
    }
}

// Undated rows are kept and placed at `today` rather than silently dropped.
fn resolve_date(raw: &str, id: &str, today: NaiveDate) -> NaiveDate {
    parse_record_date(raw).unwrap_or_else(|| {
        debug!(
            "Record {} has unparseable date '{}'; treating it as {}",
            id, raw, today
        );
        today
    })
}
