use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use plotters::prelude::*;
use ppg_lib::{
    config::{read_config, PipelineConfig},
    io::{read_peaks_csv, read_recording, stream_recording, write_recording, CsvSink},
    metrics::{
        hrv_summary, AdaptationGoal, BiofeedbackConfig, BiofeedbackEvent, BiofeedbackTracker,
        HrvSummary,
    },
    pipeline::{Pipeline, PipelineSink, PipelineStats},
    plot::{figure_from_peaks, figure_from_timeseries, Figure, PlotBackend, Series},
    queue::spawn_pipeline,
    signal::{PeakRecord, Sample, TimeSeries},
    simulate::SyntheticPpg,
};
use serde::Serialize;
use std::{
    io,
    net::UdpSocket,
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(
    name = "ppg",
    version,
    about = "Streaming PPG beat detection and HRV tools"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline over a recorder log read from --input or stdin
    Process {
        #[arg(long)]
        input: Option<PathBuf>,
        /// TOML pipeline configuration
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        denoised_out: Option<PathBuf>,
        #[arg(long)]
        peaks_out: Option<PathBuf>,
        /// Render the denoised signal to a PNG
        #[arg(long)]
        denoised_plot: Option<PathBuf>,
        /// Send valid HRV values as UDP datagrams to HOST:PORT
        #[arg(long)]
        relay: Option<String>,
        #[arg(long, default_value_t = AdaptationGoal::None)]
        goal: AdaptationGoal,
        /// Feed lines through a bounded queue of this capacity
        #[arg(long)]
        queue: Option<usize>,
    },
    /// Write a synthetic recorder log
    Simulate {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 60.0)]
        seconds: f64,
        #[arg(long, default_value_t = 50.0)]
        fs: f64,
        #[arg(long, default_value_t = 75.0)]
        bpm: f64,
        #[arg(long, default_value_t = 5.0)]
        noise: f64,
        #[arg(long, default_value_t = 7)]
        seed: u64,
        #[arg(long, default_value_t = 0)]
        heart_rate_every: usize,
        #[arg(long, default_value_t = 0)]
        malformed_every: usize,
    },
    /// Session HRV metrics of a peaks CSV written by `process`
    HrvSummary {
        #[arg(long)]
        peaks: PathBuf,
        #[arg(long, default_value_t = 1000.0)]
        ticks_per_ms: f64,
    },
    /// Render the HRV tachogram of a peaks CSV to a PNG via plotters
    HrvPlot {
        #[arg(long)]
        peaks: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 1000.0)]
        ticks_per_ms: f64,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Process {
            input,
            config,
            denoised_out,
            peaks_out,
            denoised_plot,
            relay,
            goal,
            queue,
        } => cmd_process(ProcessArgs {
            input,
            config,
            denoised_out,
            peaks_out,
            denoised_plot,
            relay,
            goal,
            queue,
        })?,
        Commands::Simulate {
            out,
            seconds,
            fs,
            bpm,
            noise,
            seed,
            heart_rate_every,
            malformed_every,
        } => {
            let sim = SyntheticPpg {
                seconds,
                fs,
                bpm,
                noise,
                seed,
                heart_rate_every,
                malformed_every,
                ..SyntheticPpg::default()
            };
            cmd_simulate(&sim, &out)?
        }
        Commands::HrvSummary {
            peaks,
            ticks_per_ms,
        } => cmd_hrv_summary(&peaks, ticks_per_ms)?,
        Commands::HrvPlot {
            peaks,
            out,
            ticks_per_ms,
        } => cmd_hrv_plot(&peaks, &out, ticks_per_ms)?,
    }
    Ok(())
}

struct ProcessArgs {
    input: Option<PathBuf>,
    config: Option<PathBuf>,
    denoised_out: Option<PathBuf>,
    peaks_out: Option<PathBuf>,
    denoised_plot: Option<PathBuf>,
    relay: Option<String>,
    goal: AdaptationGoal,
    queue: Option<usize>,
}

#[derive(Serialize)]
struct ProcessSummary {
    stats: PipelineStats,
    last_valid_hrv_ms: f64,
    hrv: HrvSummary,
    goal: AdaptationGoal,
    biofeedback: Vec<BiofeedbackEvent>,
    relayed: Option<u64>,
}

/// Forwards valid HRV values as `HRV,<timestamp>,<ticks>\n` datagrams.
struct UdpRelay {
    socket: UdpSocket,
    sent: u64,
}

impl UdpRelay {
    fn connect(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").context("binding relay socket")?;
        socket
            .connect(addr)
            .with_context(|| format!("invalid relay address {addr}"))?;
        Ok(Self { socket, sent: 0 })
    }

    fn send(&mut self, record: &PeakRecord) {
        let msg = format!("HRV,{},{:.0}\n", record.timestamp, record.hrv);
        match self.socket.send(msg.as_bytes()) {
            Ok(_) => self.sent += 1,
            Err(err) => warn!("relay send failed: {err}"),
        }
    }
}

/// Collects what the process summary needs from the pipeline callbacks.
struct SessionSink {
    ticks_per_s: f64,
    records: Vec<PeakRecord>,
    denoised: Option<Vec<f64>>,
    tracker: BiofeedbackTracker,
    events: Vec<BiofeedbackEvent>,
    relay: Option<UdpRelay>,
}

impl SessionSink {
    fn seconds(&self, timestamp: &str) -> Option<f64> {
        timestamp.parse::<f64>().ok().map(|t| t / self.ticks_per_s)
    }
}

impl PipelineSink for SessionSink {
    fn on_denoised_sample(&mut self, value: f64) {
        if let Some(denoised) = self.denoised.as_mut() {
            denoised.push(value);
        }
    }

    fn on_peak(&mut self, record: &PeakRecord) {
        self.records.push(record.clone());
    }

    fn on_valid_hrv(&mut self, record: &PeakRecord) {
        if let Some(relay) = self.relay.as_mut() {
            relay.send(record);
        }
        if let Some(at_s) = self.seconds(&record.timestamp) {
            let hrv_ms = record.hrv_ms(self.ticks_per_s / 1000.0);
            self.events.extend(self.tracker.observe_hrv(at_s, hrv_ms));
        }
    }

    fn on_heart_rate(&mut self, sample: &Sample) {
        if let Some(at_s) = self.seconds(&sample.timestamp) {
            self.events
                .extend(self.tracker.observe_heart_rate(at_s, sample.value));
        }
    }
}

/// Recorder lines from a file, or from stdin as they arrive.
fn input_lines(input: Option<&Path>) -> Result<Box<dyn Iterator<Item = io::Result<String>>>> {
    match input {
        Some(path) => Ok(Box::new(
            read_recording(path)?.into_iter().map(Ok::<_, io::Error>),
        )),
        None => Ok(Box::new(stream_recording(io::stdin().lock()))),
    }
}

fn cmd_process(args: ProcessArgs) -> Result<()> {
    let config = match args.config.as_deref() {
        Some(path) => read_config(path)?,
        None => PipelineConfig::default(),
    };
    let ticks_per_ms = config.ticks_per_ms;
    let fs = f64::from(config.fs);
    let mut pipeline = Pipeline::new(config).context("invalid pipeline configuration")?;
    let lines = input_lines(args.input.as_deref())?;

    let csv = CsvSink::create(args.denoised_out.as_deref(), args.peaks_out.as_deref())?;
    let relay = args.relay.as_deref().map(UdpRelay::connect).transpose()?;
    let session = SessionSink {
        ticks_per_s: ticks_per_ms * 1000.0,
        records: Vec::new(),
        denoised: args.denoised_plot.as_ref().map(|_| Vec::new()),
        tracker: BiofeedbackTracker::new(args.goal, BiofeedbackConfig::default()),
        events: Vec::new(),
        relay,
    };

    let (pipeline, (csv, session)) = match args.queue {
        Some(capacity) => {
            let queued = spawn_pipeline(pipeline, (csv, session), capacity);
            for line in lines {
                queued.push(line.context("reading recorder input")?)?;
            }
            let finished = queued.finish()?;
            (finished.pipeline, finished.sink)
        }
        None => {
            let mut sink = (csv, session);
            for line in lines {
                let line = line.context("reading recorder input")?;
                pipeline.ingest_line(&line, &mut sink);
            }
            (pipeline, sink)
        }
    };
    csv.finish()?;
    info!(
        "processed {} PPG samples in {} blocks",
        pipeline.stats().ppg_samples,
        pipeline.stats().blocks
    );

    if let (Some(path), Some(data)) = (args.denoised_plot.as_deref(), session.denoised) {
        let series = TimeSeries { fs, data };
        let fig = figure_from_timeseries("Denoised PPG", &series, 4096, 0x0077FF);
        PngBackend::new(path).draw(&fig)?;
    }

    let summary = ProcessSummary {
        stats: pipeline.stats().clone(),
        last_valid_hrv_ms: pipeline.hrv_state().last_valid_hrv / ticks_per_ms,
        hrv: hrv_summary(&session.records, ticks_per_ms)?,
        goal: args.goal,
        biofeedback: session.events,
        relayed: session.relay.map(|r| r.sent),
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn cmd_simulate(sim: &SyntheticPpg, out: &Path) -> Result<()> {
    let lines = sim.lines();
    write_recording(out, &lines)?;
    info!("wrote {} lines to {}", lines.len(), out.display());
    Ok(())
}

fn cmd_hrv_summary(peaks: &Path, ticks_per_ms: f64) -> Result<()> {
    let records = read_peaks_csv(peaks)?;
    let summary = hrv_summary(&records, ticks_per_ms)?;
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn cmd_hrv_plot(peaks: &Path, out: &Path, ticks_per_ms: f64) -> Result<()> {
    let records = read_peaks_csv(peaks)?;
    let fig = figure_from_peaks(&records, ticks_per_ms, 1024);
    PngBackend::new(out).draw(&fig)?;
    Ok(())
}

struct PngBackend<'a> {
    path: &'a Path,
    size: (u32, u32),
}

impl<'a> PngBackend<'a> {
    fn new(path: &'a Path) -> Self {
        Self {
            path,
            size: (800, 480),
        }
    }
}

impl PlotBackend for PngBackend<'_> {
    fn draw(&mut self, fig: &Figure) -> Result<()> {
        let (x_min, x_max, y_min, y_max) = fig
            .bounds()
            .ok_or_else(|| anyhow!("nothing to plot: the figure has no points"))?;
        let (x_min, x_max) = widen(x_min, x_max);
        let (y_min, y_max) = widen(y_min, y_max);
        let root = BitMapBackend::new(self.path, self.size).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption(
                fig.title.clone().unwrap_or_else(|| "Plot".into()),
                ("sans-serif", 24),
            )
            .x_label_area_size(30)
            .y_label_area_size(50)
            .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
        let mut mesh = chart.configure_mesh();
        if let Some(label) = fig.x.label.as_deref() {
            mesh.x_desc(label);
        }
        if let Some(label) = fig.y.label.as_deref() {
            mesh.y_desc(label);
        }
        mesh.draw()?;
        for series in &fig.series {
            match series {
                Series::Line(line) => {
                    let (r, g, b) = line.style.color.rgb();
                    chart.draw_series(LineSeries::new(
                        line.points.iter().map(|p| (p[0], p[1])),
                        RGBColor(r, g, b).stroke_width(line.style.width.round().max(1.0) as u32),
                    ))?;
                }
            }
        }
        root.present()
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}

/// Keep a degenerate axis range drawable.
fn widen(min: f64, max: f64) -> (f64, f64) {
    if max > min {
        (min, max)
    } else {
        (min - 1.0, max + 1.0)
    }
}
