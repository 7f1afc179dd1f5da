//! CSV parse and stringify stages
//!
//! Parsing works line by line on top of [`ExStream::split`], so quoted
//! fields cannot contain line breaks. A line that cannot be parsed becomes
//! a failure carrying the line; the rest of the input is still parsed.

use std::collections::HashMap;

use async_stream::stream;
use csv::{ReaderBuilder, StringRecord, Terminator, WriterBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::BoxError;
use crate::event::{Event, Failure};
use crate::stream::ExStream;
use crate::stream_configuration::CsvConfig;

fn checked(combinator: &str, config: &CsvConfig) {
    if let Err(e) = config.validate() {
        panic!("{}: {}", combinator, e);
    }
}

struct LineParser {
    config: CsvConfig,
    headers: Option<StringRecord>,
}

impl LineParser {
    fn new(config: CsvConfig) -> Self {
        Self {
            config,
            headers: None,
        }
    }

    /// `None` for blank lines and the header line.
    fn parse(&mut self, line: &str) -> Option<Result<StringRecord, BoxError>> {
        if line.trim().is_empty() {
            return None;
        }
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.config.delimiter)
            .quote(self.config.quote)
            .from_reader(line.as_bytes());
        let mut record = StringRecord::new();
        match reader.read_record(&mut record) {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => return Some(Err(e.into())),
        }

        if self.config.has_headers && self.headers.is_none() {
            log::trace!("csv: {} column(s)", record.len());
            self.headers = Some(record);
            return None;
        }
        if let Some(headers) = &self.headers {
            if headers.len() != record.len() {
                return Some(Err(format!(
                    "expected {} fields but found {}",
                    headers.len(),
                    record.len()
                )
                .into()));
            }
        }
        Some(Ok(record))
    }
}

impl<T> ExStream<T>
where
    T: AsRef<str> + Send + 'static,
{
    fn csv_stage<U, F>(self, config: CsvConfig, mut convert: F) -> ExStream<U>
    where
        U: Send + 'static,
        F: FnMut(&StringRecord, Option<&StringRecord>) -> Result<U, BoxError> + Send + 'static,
    {
        let mut parser = LineParser::new(config);
        self.split().stage(false, move |mut lines| {
            stream! {
                loop {
                    let out = match lines.pull().await {
                        Event::Value(line) => match parser.parse(&line) {
                            None => None,
                            Some(Ok(record)) => match convert(&record, parser.headers.as_ref()) {
                                Ok(row) => Some(Event::Value(row)),
                                Err(e) => Some(Event::Failure(Failure::with_input(e, line))),
                            },
                            Some(Err(e)) => Some(Event::Failure(Failure::with_input(e, line))),
                        },
                        Event::Failure(e) => Some(Event::Failure(e)),
                        Event::End => break,
                    };
                    if let Some(out) = out {
                        yield out;
                    }
                }
            }
        })
    }

    /// Parses text chunks into records.
    ///
    /// With `has_headers` the first non-blank line is taken as the header and
    /// every later record must have as many fields.
    ///
    /// # Panics
    ///
    /// Panics if `config` does not validate.
    pub fn csv_parse(self, config: CsvConfig) -> ExStream<Vec<String>> {
        checked("csv_parse", &config);
        self.csv_stage(config, |record, _| {
            Ok(record.iter().map(String::from).collect())
        })
    }

    /// Parses text chunks into rows keyed by column name.
    ///
    /// Without headers the keys are the column positions, starting at `"0"`.
    ///
    /// # Panics
    ///
    /// Panics if `config` does not validate.
    pub fn csv_parse_records(self, config: CsvConfig) -> ExStream<HashMap<String, String>> {
        checked("csv_parse_records", &config);
        self.csv_stage(config, |record, headers| {
            let row = match headers {
                Some(headers) => headers
                    .iter()
                    .zip(record.iter())
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                None => record
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), v.to_string()))
                    .collect(),
            };
            Ok(row)
        })
    }

    /// Parses text chunks into typed rows.
    ///
    /// Fields are matched to `R` by header name when the config has headers,
    /// by position otherwise. A row that does not fit `R` becomes a failure.
    ///
    /// # Panics
    ///
    /// Panics if `config` does not validate.
    pub fn csv_deserialize<R>(self, config: CsvConfig) -> ExStream<R>
    where
        R: DeserializeOwned + Send + 'static,
    {
        checked("csv_deserialize", &config);
        self.csv_stage(config, |record, headers| {
            record.deserialize::<R>(headers).map_err(Into::into)
        })
    }
}

fn render<F>(config: &CsvConfig, with_headers: bool, write: F) -> Result<String, BoxError>
where
    F: FnOnce(&mut csv::Writer<Vec<u8>>) -> csv::Result<()>,
{
    let terminator = match config.line_terminator.as_bytes() {
        b"\r\n" => Terminator::CRLF,
        [byte] => Terminator::Any(*byte),
        _ => return Err(format!("unsupported line terminator {:?}", config.line_terminator).into()),
    };
    let mut writer = WriterBuilder::new()
        .delimiter(config.delimiter)
        .quote(config.quote)
        .terminator(terminator)
        .has_headers(with_headers)
        .from_writer(Vec::new());
    write(&mut writer)?;
    let bytes = writer.into_inner().map_err(|e| -> BoxError { Box::new(e.into_error()) })?;
    Ok(String::from_utf8(bytes)?)
}

impl<T> ExStream<T>
where
    T: IntoIterator + Send + 'static,
    T::Item: AsRef<[u8]>,
{
    /// Renders each record as one line of CSV text.
    ///
    /// `has_headers` is ignored: records carry no column names.
    ///
    /// # Panics
    ///
    /// Panics if `config` does not validate.
    pub fn csv_stringify(self, config: CsvConfig) -> ExStream<String> {
        checked("csv_stringify", &config);
        self.stage(false, move |mut up| {
            stream! {
                loop {
                    let out = match up.pull().await {
                        Event::Value(record) => Event::from_result(
                            render(&config, false, |w| w.write_record(record)),
                        ),
                        Event::Failure(e) => Event::Failure(e),
                        Event::End => break,
                    };
                    yield out;
                }
            }
        })
    }
}

impl<T> ExStream<T>
where
    T: Serialize + Send + 'static,
{
    /// Renders each row as CSV text.
    ///
    /// With `has_headers` the chunk for the first row starts with a header
    /// line derived from the field names of `T`.
    ///
    /// # Panics
    ///
    /// Panics if `config` does not validate.
    pub fn csv_serialize(self, config: CsvConfig) -> ExStream<String> {
        checked("csv_serialize", &config);
        self.stage(false, move |mut up| {
            stream! {
                let mut first = true;
                loop {
                    let out = match up.pull().await {
                        Event::Value(row) => {
                            let with_headers = config.has_headers && first;
                            let rendered = render(&config, with_headers, |w| w.serialize(&row));
                            if rendered.is_ok() {
                                first = false;
                            }
                            Event::from_result(rendered)
                        }
                        Event::Failure(e) => Event::Failure(e),
                        Event::End => break,
                    };
                    yield out;
                }
            }
        })
    }
}
