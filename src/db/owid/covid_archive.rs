// COVID-19 data published by Our World in Data, one row per country and day.
// https://github.com/owid/covid-19-data/tree/master/public/data
//
// Only the vaccination and hospitalisation time series are kept.  They are
// written into the `country` table, keyed by the ISO alpha-3 code.

use std::collections::BTreeMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio_postgres::types::Json;

use crate::error::RefreshError;
use crate::utils::lib_postgres::{connect, DbConfig};

/// Columns of the source file this archive reads.
pub const REQUIRED_COLUMNS: [&str; 4] = ["iso_code", "date", "total_vaccinations", "hosp_patients"];

#[derive(Clone, Debug)]
pub struct OwidCovidArchive {
    pub url: String,
}

/// The subset of a csv row that is used.  An empty field is `None`.
#[derive(Debug, Deserialize)]
struct RawRow {
    iso_code: String,
    date: String,
    total_vaccinations: Option<String>,
    hosp_patients: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SeriesEntry {
    pub date: String,
    pub count: i64,
}

/// Both time series of a country, in the order of the source file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CountrySeries {
    pub vaccinations: Vec<SeriesEntry>,
    pub hospitalisations: Vec<SeriesEntry>,
}

pub type CovidSeries = BTreeMap<String, CountrySeries>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Series {
    Vaccinations,
    Hospitalisations,
}

impl Series {
    pub fn sql(&self) -> &'static str {
        match self {
            Series::Vaccinations => {
                r#"
UPDATE country SET
    covid_vaccinations = $1::BIGINT,
    covid_vaccinations_time_series = $2::JSONB
WHERE iso_alpha3 = $3;
"#
            }
            Series::Hospitalisations => {
                r#"
UPDATE country SET
    covid_hospitalisations = $1::BIGINT,
    covid_hospitalisations_time_series = $2::JSONB
WHERE iso_alpha3 = $3;
"#
            }
        }
    }
}

/// One UPDATE statement to run against the `country` table.
#[derive(Debug, PartialEq)]
pub struct CountryUpdate<'a> {
    pub iso_code: &'a str,
    pub series: Series,
    pub latest: i64,
    pub history: &'a [SeriesEntry],
}

#[derive(Debug, Default, PartialEq)]
pub struct RefreshSummary {
    pub countries: usize,
    pub statements: usize,
    pub rows_updated: u64,
}

impl OwidCovidArchive {
    /// Download, parse and write to the database.  Nothing is written if
    /// the download or the parsing fails.
    pub async fn refresh(&self, config: &DbConfig) -> Result<RefreshSummary, RefreshError> {
        let text = self.download().await?;
        let series = self.read_csv(&text)?;
        self.update_postgres(config, &series).await
    }

    /// Get the whole file as text.  Fails on a non-success status.
    pub async fn download(&self) -> Result<String, RefreshError> {
        info!("downloading {} ...", self.url);
        let response = reqwest::get(&self.url).await?.error_for_status()?;
        let text = response.text().await?;
        info!("downloaded {} bytes", text.len());
        Ok(text)
    }

    /// Group the rows of the csv file by country code.  Rows without a
    /// vaccination or a hospitalisation value are skipped.
    pub fn read_csv(&self, text: &str) -> Result<CovidSeries, RefreshError> {
        // short rows leave their trailing fields empty
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());
        let headers = rdr.headers()?;
        if let Some(column) = REQUIRED_COLUMNS
            .iter()
            .find(|&&c| !headers.iter().any(|h| h == c))
        {
            return Err(RefreshError::MissingColumn(column.to_string()));
        }

        let mut lookup = CovidSeries::new();
        let mut skipped = 0;
        for record in rdr.deserialize::<RawRow>() {
            let row = record?;
            if row.total_vaccinations.is_none() && row.hosp_patients.is_none() {
                skipped += 1;
                continue;
            }
            let entry = lookup.entry(row.iso_code.clone()).or_default();
            if let Some(value) = &row.total_vaccinations {
                entry.vaccinations.push(SeriesEntry {
                    date: row.date.clone(),
                    count: parse_count(&row, value)?,
                });
            }
            if let Some(value) = &row.hosp_patients {
                entry.hospitalisations.push(SeriesEntry {
                    date: row.date.clone(),
                    count: parse_count(&row, value)?,
                });
            }
        }
        debug!("skipped {} rows with no data", skipped);
        info!("parsed time series for {} countries", lookup.len());
        Ok(lookup)
    }

    /// Run all the updates in one transaction on a fresh connection.
    /// Country codes not in the table update zero rows, which is fine.
    pub async fn update_postgres(
        &self,
        config: &DbConfig,
        series: &CovidSeries,
    ) -> Result<RefreshSummary, RefreshError> {
        let mut client = connect(config).await?;
        let tx = client.transaction().await?;
        let mut summary = RefreshSummary {
            countries: series.len(),
            ..Default::default()
        };
        for update in country_updates(series) {
            let n = tx
                .execute(
                    update.series.sql(),
                    &[&update.latest, &Json(update.history), &update.iso_code],
                )
                .await?;
            if n == 0 {
                debug!("no country row for {}", update.iso_code);
            }
            summary.statements += 1;
            summary.rows_updated += n;
        }
        tx.commit().await?;
        info!(
            "updated {} rows with {} statements",
            summary.rows_updated, summary.statements
        );
        Ok(summary)
    }
}

/// The statements to run, one per non-empty series.  The latest value is
/// the last entry in file order.
pub fn country_updates(series: &CovidSeries) -> Vec<CountryUpdate<'_>> {
    let mut out = Vec::new();
    for (iso_code, country) in series {
        for (kind, history) in [
            (Series::Vaccinations, &country.vaccinations),
            (Series::Hospitalisations, &country.hospitalisations),
        ] {
            if let Some(last) = history.last() {
                out.push(CountryUpdate {
                    iso_code,
                    series: kind,
                    latest: last.count,
                    history,
                });
            }
        }
    }
    out
}

/// Counts may come as "1234.0".  Parse as a float and truncate.
/// Values outside the `i64` range are rejected.
fn parse_count(row: &RawRow, value: &str) -> Result<i64, RefreshError> {
    match value.trim().parse::<f64>().map(f64::trunc) {
        Ok(x) if (i64::MIN as f64..i64::MAX as f64).contains(&x) => Ok(x as i64),
        _ => Err(RefreshError::InvalidCount {
            iso_code: row.iso_code.clone(),
            date: row.date.clone(),
            value: value.to_string(),
        }),
    }
}
