use crate::{AnomalyEvent, OutputConfig, OutputFormat, Result};
use csv::{QuoteStyle, WriterBuilder};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use tracing::info;

/// Destination for the deduplicated events of each unit, written in unit order.
pub trait AnomalySink: Send {
    fn write_events(&mut self, events: &[AnomalyEvent]) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    epoch_column: bool,
}

impl<W: Write> CsvSink<W> {
    pub fn new(inner: W, epoch_column: bool, header: bool) -> Result<Self> {
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .quote_style(QuoteStyle::Necessary)
            .from_writer(inner);

        if header {
            writer.write_record(AnomalyEvent::header(epoch_column))?;
        }

        Ok(Self {
            writer,
            epoch_column,
        })
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| crate::GridError::Io(e.into_error()))
    }
}

impl<W: Write + Send> AnomalySink for CsvSink<W> {
    fn write_events(&mut self, events: &[AnomalyEvent]) -> Result<()> {
        for event in events {
            self.writer.write_record(event.to_record(self.epoch_column))?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> AnomalySink for JsonLinesSink<W> {
    fn write_events(&mut self, events: &[AnomalyEvent]) -> Result<()> {
        for event in events {
            serde_json::to_writer(&mut self.writer, event)?;
            self.writer.write_all(b"\n")?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Create the output file (and its directory) for the configured format.
pub fn open_sink(config: &OutputConfig) -> Result<Box<dyn AnomalySink>> {
    if let Some(parent) = config.path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file = BufWriter::new(File::create(&config.path)?);
    info!("Writing anomalies to {}", config.path.display());

    Ok(match config.format {
        OutputFormat::Csv => Box::new(CsvSink::new(file, config.epoch_column, config.header)?),
        OutputFormat::JsonLines => Box::new(JsonLinesSink::new(file)),
    })
}
