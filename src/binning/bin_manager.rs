//! Fixed-width time bucketing.
//!
//! A `BinManager` owns a contiguous run of bins starting at its domain
//! start. Adding a value far ahead of the last bin back-fills every bin in
//! between, so rendered series never have gaps.
//!
//! Bin indices are absolute: `floor((v - start) / size) + ceil(start / size)`.
//! Two managers anchored at different starts (the whole test and a marker
//! window, say) therefore agree on which bin index a given instant falls in.
//! The rendered domain column is `absolute_index * size / 1000`, i.e.
//! seconds from zero rather than from the domain start.

use super::AggregationType;
use crate::csv_format::{write_quoted_line, DELIMITER};
use crate::error::{PipelineError, Result};
use crate::utils::{mean, percentile, NumberFormat};
use std::io::{self, Write};

/// One time bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct Bin {
    absolute_index: i64,
    counter: u64,
    values: Vec<f64>,
}

impl Bin {
    fn new(absolute_index: i64) -> Self {
        Self {
            absolute_index,
            counter: 0,
            values: Vec::new(),
        }
    }

    pub fn absolute_index(&self) -> i64 {
        self.absolute_index
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Range value of this bin under `aggregation`.
    pub fn aggregate(&self, aggregation: AggregationType) -> f64 {
        match aggregation {
            AggregationType::Count => self.counter as f64,
            AggregationType::Mean => mean(&self.values),
            AggregationType::Median => percentile(&self.values, 50.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BinManager {
    domain_start: i64,
    bin_size: i64,
    index_offset: i64,
    bins: Vec<Bin>,
}

fn ceil_div(numerator: i64, denominator: i64) -> i64 {
    let quotient = numerator.div_euclid(denominator);
    if numerator.rem_euclid(denominator) == 0 {
        quotient
    } else {
        quotient + 1
    }
}

impl BinManager {
    /// `bin_size` is in millis and must be positive.
    pub fn new(domain_start: i64, bin_size: i64) -> Result<Self> {
        if bin_size <= 0 {
            return Err(PipelineError::Precondition(format!(
                "bin size must be positive, got {}",
                bin_size
            )));
        }
        Ok(Self {
            domain_start,
            bin_size,
            index_offset: ceil_div(domain_start, bin_size),
            bins: Vec::new(),
        })
    }

    pub fn domain_start(&self) -> i64 {
        self.domain_start
    }

    pub fn bin_size(&self) -> i64 {
        self.bin_size
    }

    /// Count a domain value without a range value.
    pub fn add_timestamp(&mut self, domain_value: i64) -> Result<()> {
        self.add_value(domain_value, None)
    }

    pub fn add_value(&mut self, domain_value: i64, range_value: Option<f64>) -> Result<()> {
        if domain_value < self.domain_start {
            return Err(PipelineError::Precondition(format!(
                "domain value {} is below domain start {}",
                domain_value, self.domain_start
            )));
        }

        let relative = ((domain_value - self.domain_start) / self.bin_size) as usize;
        while self.bins.len() <= relative {
            let absolute = self.bins.len() as i64 + self.index_offset;
            self.bins.push(Bin::new(absolute));
        }

        let bin = &mut self.bins[relative];
        bin.counter += 1;
        if let Some(value) = range_value {
            bin.values.push(value);
        }
        Ok(())
    }

    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Bin counters in index order.
    pub fn counts(&self) -> impl Iterator<Item = u64> + '_ {
        self.bins.iter().map(Bin::counter)
    }

    /// Per-bin value lists in index order.
    pub fn values(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.bins.iter().map(Bin::values)
    }

    /// All values of all bins, flattened.
    pub fn flat_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.bins.iter().flat_map(|bin| bin.values.iter().copied())
    }

    /// Render a header line and one line per bin.
    pub fn to_csv<W: Write + ?Sized>(
        &self,
        out: &mut W,
        domain_header: &str,
        range_header: &str,
        format: &NumberFormat,
        aggregation: AggregationType,
    ) -> io::Result<()> {
        write_quoted_line(out, DELIMITER, [domain_header, range_header])?;
        for bin in &self.bins {
            let domain = (bin.absolute_index * self.bin_size) as f64 / 1000.0;
            let range = bin.aggregate(aggregation);
            write_quoted_line(
                out,
                DELIMITER,
                [format.format(domain), format.format(range)],
            )?;
        }
        Ok(())
    }
}
