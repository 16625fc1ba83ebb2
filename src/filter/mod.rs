//! Faceted listing filter.
//!
//! A [`FilterRequest`] is validated and compiled into a [`Predicate`]: a flat
//! conjunction of clauses that is pure data until it is pushed into a query
//! (see [`sql`]).

use std::ops::RangeInclusive;

use serde::Deserialize;
use thiserror::Error;

pub mod sql;

/// Six-digit administrative region codes.
const REGION_CODES: RangeInclusive<i32> = 100_000..=999_999;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("invalid filter value {value} for {field}")]
    InvalidFilterValue { field: &'static str, value: i32 },
}

/// Address hierarchy; `0` or absent means "not given".
#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct AddressFilter {
    pub province: Option<i32>,
    pub city: Option<i32>,
    #[serde(rename = "distinct")]
    pub region: Option<i32>,
}

impl AddressFilter {
    fn given(code: Option<i32>) -> Option<i32> {
        code.filter(|c| *c != 0)
    }
}

/// Body of `POST /house/select`.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct FilterRequest {
    pub address: AddressFilter,
    pub price: Vec<i32>,
    pub size: Vec<i32>,
    pub special: Vec<i32>,
    pub room: Vec<i32>,
    pub direction: Vec<i32>,
    pub height: Vec<i32>,
    pub renovation: Vec<i32>,
    #[serde(rename = "subjectmatter")]
    pub subject_matter: Vec<i32>,
}

impl FilterRequest {
    pub fn address_only(address: AddressFilter) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }
}

/// Small closed enumerations filtered by set membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facet {
    Direction,
    Height,
    Renovation,
    Room,
    Special,
    SubjectMatter,
}

impl Facet {
    pub const ALL: [Facet; 6] = [
        Facet::Direction,
        Facet::Height,
        Facet::Renovation,
        Facet::Room,
        Facet::Special,
        Facet::SubjectMatter,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Facet::Direction => "direction",
            Facet::Height => "height",
            Facet::Renovation => "renovation",
            Facet::Room => "room",
            Facet::Special => "special",
            Facet::SubjectMatter => "subject_matter",
        }
    }

    /// Name of the request field, used in error reports.
    pub fn field(self) -> &'static str {
        match self {
            Facet::SubjectMatter => "subjectmatter",
            other => other.column(),
        }
    }

    pub fn range(self) -> RangeInclusive<i32> {
        match self {
            Facet::Direction => 0..=10,
            Facet::Height => 0..=3,
            Facet::Renovation => 0..=4,
            Facet::Room => 0..=5,
            Facet::Special => 0..=5,
            Facet::SubjectMatter => 0..=4,
        }
    }

    fn requested(self, req: &FilterRequest) -> &[i32] {
        match self {
            Facet::Direction => &req.direction,
            Facet::Height => &req.height,
            Facet::Renovation => &req.renovation,
            Facet::Room => &req.room,
            Facet::Special => &req.special,
            Facet::SubjectMatter => &req.subject_matter,
        }
    }
}

/// Half-open interval `[lower, upper)`; no upper bound on the last bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub lower: f64,
    pub upper: Option<f64>,
}

impl Band {
    const fn new(lower: f64, upper: f64) -> Self {
        Self {
            lower,
            upper: Some(upper),
        }
    }

    const fn open_ended(lower: f64) -> Self {
        Self { lower, upper: None }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && self.upper.map_or(true, |u| value < u)
    }
}

pub const PRICE_BANDS: [Band; 5] = [
    Band::new(0.0, 100.0),
    Band::new(100.0, 300.0),
    Band::new(300.0, 500.0),
    Band::new(500.0, 1000.0),
    Band::open_ended(1000.0),
];

pub const SIZE_BANDS: [Band; 5] = [
    Band::new(0.0, 50.0),
    Band::new(50.0, 100.0),
    Band::new(100.0, 150.0),
    Band::new(150.0, 200.0),
    Band::open_ended(200.0),
];

/// Continuous attributes filtered by bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    Price,
    Size,
}

impl Measure {
    pub fn column(self) -> &'static str {
        match self {
            Measure::Price => "price",
            Measure::Size => "size",
        }
    }

    pub fn bands(self) -> &'static [Band] {
        match self {
            Measure::Price => &PRICE_BANDS,
            Measure::Size => &SIZE_BANDS,
        }
    }

    fn requested(self, req: &FilterRequest) -> &[i32] {
        match self {
            Measure::Price => &req.price,
            Measure::Size => &req.size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionScope {
    Exact(i32),
    /// `lower <= region_code < upper`
    Within { lower: i32, upper: i32 },
}

impl RegionScope {
    pub fn contains(self, code: i32) -> bool {
        match self {
            RegionScope::Exact(c) => c == code,
            RegionScope::Within { lower, upper } => (lower..upper).contains(&code),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Region(RegionScope),
    /// OR of the listed bands.
    AnyBand { measure: Measure, bands: Vec<Band> },
    /// Sorted, deduplicated membership set.
    OneOf { facet: Facet, values: Vec<i32> },
}

/// Conjunction of clauses. Empty means "every listing".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    pub clauses: Vec<Clause>,
}

impl Predicate {
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

fn check_region(field: &'static str, code: Option<i32>) -> Result<Option<i32>, FilterError> {
    match AddressFilter::given(code) {
        Some(value) if !REGION_CODES.contains(&value) => {
            Err(FilterError::InvalidFilterValue { field, value })
        }
        other => Ok(other),
    }
}

fn compile_region(address: &AddressFilter) -> Result<Option<RegionScope>, FilterError> {
    let province = check_region("address.province", address.province)?;
    let city = check_region("address.city", address.city)?;
    let region = check_region("address.distinct", address.region)?;

    // Finest granularity wins.
    Ok(match (region, city, province) {
        (Some(code), _, _) => Some(RegionScope::Exact(code)),
        (None, Some(code), _) => {
            let lower = code / 100 * 100;
            Some(RegionScope::Within {
                lower,
                upper: lower + 100,
            })
        }
        (None, None, Some(code)) => {
            let lower = code / 10_000 * 10_000;
            Some(RegionScope::Within {
                lower,
                upper: lower + 10_000,
            })
        }
        (None, None, None) => None,
    })
}

fn sorted_unique(values: &[i32]) -> Vec<i32> {
    let mut out = values.to_vec();
    out.sort_unstable();
    out.dedup();
    out
}

fn compile_bands(measure: Measure, req: &FilterRequest) -> Result<Option<Clause>, FilterError> {
    let indices = measure.requested(req);
    if indices.is_empty() {
        return Ok(None);
    }
    let table = measure.bands();
    let bands = sorted_unique(indices)
        .into_iter()
        .map(|i| {
            usize::try_from(i)
                .ok()
                .and_then(|idx| table.get(idx).copied())
                .ok_or(FilterError::InvalidFilterValue {
                    field: measure.column(),
                    value: i,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(Clause::AnyBand { measure, bands }))
}

fn compile_facet(facet: Facet, req: &FilterRequest) -> Result<Option<Clause>, FilterError> {
    let values = facet.requested(req);
    if let Some(&value) = values.iter().find(|v| !facet.range().contains(*v)) {
        return Err(FilterError::InvalidFilterValue {
            field: facet.field(),
            value,
        });
    }
    if values.is_empty() {
        return Ok(None);
    }
    Ok(Some(Clause::OneOf {
        facet,
        values: sorted_unique(values),
    }))
}

/// Validate `req` and build its predicate. Nothing touches the store here, so
/// an invalid request is rejected before any query runs.
pub fn compile(req: &FilterRequest) -> Result<Predicate, FilterError> {
    let mut clauses = Vec::new();

    if let Some(scope) = compile_region(&req.address)? {
        clauses.push(Clause::Region(scope));
    }
    for measure in [Measure::Price, Measure::Size] {
        clauses.extend(compile_bands(measure, req)?);
    }
    for facet in Facet::ALL {
        clauses.extend(compile_facet(facet, req)?);
    }

    Ok(Predicate { clauses })
}

#[cfg(test)]
impl Predicate {
    /// In-memory evaluation, mirrors the SQL rendering.
    pub fn matches(&self, listing: &crate::listings::repo_types::Listing) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::Region(scope) => scope.contains(listing.region_code),
            Clause::AnyBand { measure, bands } => {
                let value = match measure {
                    Measure::Price => listing.price,
                    Measure::Size => listing.size,
                };
                bands.iter().any(|b| b.contains(value))
            }
            Clause::OneOf { facet, values } => {
                let value = match facet {
                    Facet::Direction => listing.direction,
                    Facet::Height => listing.height,
                    Facet::Renovation => listing.renovation,
                    Facet::Room => listing.room,
                    Facet::Special => listing.special,
                    Facet::SubjectMatter => listing.subject_matter,
                };
                values.binary_search(&value).is_ok()
            }
        })
    }
}
