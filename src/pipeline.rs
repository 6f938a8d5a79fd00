// src/pipeline.rs

use rusqlite::Connection;
use std::fmt;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::extract::{self, ExtractOptions, RawRow, SkippedRow};
use crate::fetch::DocumentSource;
use crate::load;
use crate::progress::ProgressLog;
use crate::query::{run_query, standard_queries, QueryResult};
use crate::transform::{self, EnrichedRow, ExchangeRateTable};

/// Where a run is. Forward moves go strictly one step at a time; `Failed`
/// is terminal and reachable from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    Extracted,
    Transformed,
    CsvWritten,
    DbConnected,
    DbLoaded,
    Queried,
    Done,
    Failed,
}

impl Stage {
    pub fn next(self) -> Option<Stage> {
        use Stage::*;
        match self {
            Start => Some(Extracted),
            Extracted => Some(Transformed),
            Transformed => Some(CsvWritten),
            CsvWritten => Some(DbConnected),
            DbConnected => Some(DbLoaded),
            DbLoaded => Some(Queried),
            Queried => Some(Done),
            Done | Failed => None,
        }
    }

    /// Progress-log line written on entering this stage.
    pub fn message(self) -> &'static str {
        use Stage::*;
        match self {
            Start => "Preliminaries complete. Initiating ETL process",
            Extracted => "Data extraction complete. Initiating Transformation process",
            Transformed => "Data transformation complete. Initiating loading process",
            CsvWritten => "Data saved to CSV file",
            DbConnected => "SQL Connection initiated.",
            DbLoaded => "Data loaded to Database as table, Executing queries",
            Queried => "Process Complete.",
            Done => "Server Connection closed",
            Failed => "Process failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Start => "START",
            Stage::Extracted => "EXTRACTED",
            Stage::Transformed => "TRANSFORMED",
            Stage::CsvWritten => "CSV_WRITTEN",
            Stage::DbConnected => "DB_CONNECTED",
            Stage::DbLoaded => "DB_LOADED",
            Stage::Queried => "QUERIED",
            Stage::Done => "DONE",
            Stage::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct QueryOutput {
    pub query: String,
    pub result: QueryResult,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub skipped: Vec<SkippedRow>,
    pub rows: Vec<EnrichedRow>,
    pub rows_loaded: usize,
    pub queries: Vec<QueryOutput>,
}

/// One linear extract → transform → load → query run. Owns the database
/// connection from `connect` until the run ends either way.
pub struct Pipeline<S: DocumentSource> {
    config: Config,
    source: S,
    log: ProgressLog,
    stage: Stage,
    conn: Option<Connection>,
}

impl<S: DocumentSource> Pipeline<S> {
    pub fn new(config: Config, source: S) -> Result<Self> {
        config.validate()?;
        let log = ProgressLog::new(config.log_path.clone());
        Ok(Self {
            config,
            source,
            log,
            stage: Stage::Start,
            conn: None,
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn ensure_next(&self, to: Stage) -> Result<()> {
        if self.stage.next() == Some(to) {
            Ok(())
        } else {
            Err(PipelineError::OutOfOrder {
                from: self.stage,
                to,
            })
        }
    }

    fn advance(&mut self, to: Stage) -> Result<()> {
        self.ensure_next(to)?;
        self.log.record(to.message())?;
        self.stage = to;
        Ok(())
    }

    /// Gate for every stage call: refuse anything but the next stage (and
    /// everything once `Failed`), and log the run start on the first call.
    fn begin(&mut self, to: Stage) -> Result<()> {
        self.ensure_next(to)?;
        if self.stage == Stage::Start {
            let res = self.log.record(Stage::Start.message()).map(|_| ());
            return self.guard(res);
        }
        Ok(())
    }

    /// Any error coming out of a stage moves the run to `Failed`.
    fn guard<T>(&mut self, res: Result<T>) -> Result<T> {
        if let Err(e) = &res {
            self.fail(e);
        }
        res
    }

    pub fn extract(&mut self) -> Result<extract::Extraction> {
        self.begin(Stage::Extracted)?;
        let res = self.extract_stage();
        self.guard(res)
    }

    fn extract_stage(&mut self) -> Result<extract::Extraction> {
        let opts = ExtractOptions {
            table_class: self.config.table_class.clone(),
            selection: self.config.table_selection.clone(),
        };
        let extraction = extract::extract(&self.source, &opts)?;
        if !extraction.skipped.is_empty() {
            warn!(count = extraction.skipped.len(), "rows skipped during extraction");
        }
        self.advance(Stage::Extracted)?;
        Ok(extraction)
    }

    pub fn transform(&mut self, rows: &[RawRow]) -> Result<Vec<EnrichedRow>> {
        self.begin(Stage::Transformed)?;
        let res = self.transform_stage(rows);
        self.guard(res)
    }

    fn transform_stage(&mut self, rows: &[RawRow]) -> Result<Vec<EnrichedRow>> {
        let rates = ExchangeRateTable::from_csv_path(&self.config.rate_path)?;
        let enriched = transform::transform(rows, &rates, &self.config.target_currencies)?;
        self.advance(Stage::Transformed)?;
        Ok(enriched)
    }

    pub fn write_csv(&mut self, rows: &[EnrichedRow]) -> Result<()> {
        self.begin(Stage::CsvWritten)?;
        let res = load::write_csv(rows, &self.config.target_currencies, &self.config.csv_path)
            .and_then(|_| self.advance(Stage::CsvWritten));
        self.guard(res)
    }

    pub fn connect(&mut self) -> Result<()> {
        self.begin(Stage::DbConnected)?;
        let res = load::open_db(&self.config.db_path).and_then(|conn| {
            self.conn = Some(conn);
            self.advance(Stage::DbConnected)
        });
        self.guard(res)
    }

    pub fn load_table(&mut self, rows: &[EnrichedRow]) -> Result<usize> {
        self.begin(Stage::DbLoaded)?;
        let res = self.load_stage(rows);
        self.guard(res)
    }

    fn load_stage(&mut self, rows: &[EnrichedRow]) -> Result<usize> {
        let conn = self.conn.as_mut().ok_or(PipelineError::OutOfOrder {
            from: self.stage,
            to: Stage::DbLoaded,
        })?;
        let n = load::replace_table(
            conn,
            &self.config.table_name,
            &self.config.target_currencies,
            rows,
        )?;
        self.advance(Stage::DbLoaded)?;
        Ok(n)
    }

    pub fn run_queries(&mut self) -> Result<Vec<QueryOutput>> {
        self.begin(Stage::Queried)?;
        let res = self.query_stage();
        self.guard(res)
    }

    fn query_stage(&mut self) -> Result<Vec<QueryOutput>> {
        let conn = self.conn.as_ref().ok_or(PipelineError::OutOfOrder {
            from: self.stage,
            to: Stage::Queried,
        })?;

        let mut outputs = Vec::new();
        for query in standard_queries(&self.config.table_name, &self.config.average_currency) {
            let result = run_query(&query, conn)?;
            if self.config.print_queries {
                println!("{}", query);
                println!("{}", result);
            }
            outputs.push(QueryOutput { query, result });
        }
        self.advance(Stage::Queried)?;
        Ok(outputs)
    }

    /// Close the connection and enter `Done`.
    pub fn finish(&mut self) -> Result<()> {
        self.begin(Stage::Done)?;
        let res = self
            .close_connection()
            .and_then(|_| self.advance(Stage::Done));
        self.guard(res)
    }

    fn close_connection(&mut self) -> Result<()> {
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, e)| PipelineError::Store(e)),
            None => Ok(()),
        }
    }

    /// Enter `Failed`: log the terminal event and release the connection.
    fn fail(&mut self, err: &PipelineError) {
        let from = self.stage;
        self.stage = Stage::Failed;
        error!(stage = %from, error = %err, "run failed");
        if let Err(e) = self
            .log
            .record(&format!("{} during {}: {}", Stage::Failed.message(), from, err))
        {
            warn!(error = %e, "could not record failure");
        }

        let had_conn = self.conn.is_some();
        if let Err(e) = self.close_connection() {
            warn!(error = %e, "closing connection after failure");
        }
        if had_conn {
            if let Err(e) = self.log.record(Stage::Done.message()) {
                warn!(error = %e, "could not record connection close");
            }
        }
    }

    fn run_stages(&mut self) -> Result<RunReport> {
        let extraction = self.extract()?;
        let rows = self.transform(&extraction.rows)?;
        self.write_csv(&rows)?;
        self.connect()?;
        let rows_loaded = self.load_table(&rows)?;
        let queries = self.run_queries()?;
        self.finish()?;

        Ok(RunReport {
            skipped: extraction.skipped,
            rows,
            rows_loaded,
            queries,
        })
    }

    /// Run every stage in order. The first error has already moved the run
    /// to `Failed` and closed the connection; it is returned unchanged.
    /// Nothing is retried.
    pub fn run(mut self) -> Result<RunReport> {
        if self.stage != Stage::Start {
            return Err(PipelineError::OutOfOrder {
                from: self.stage,
                to: Stage::Extracted,
            });
        }
        let report = self.run_stages()?;
        info!(
            rows = report.rows_loaded,
            skipped = report.skipped.len(),
            "run complete"
        );
        Ok(report)
    }
}
