// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{bail, Context, Result};
use clap::Args;
use image::DynamicImage;
use std::io::Read;
use std::path::PathBuf;
use tracing::info;

use crate::config::DetectorConfig;
use crate::detection::{BoxEncoding, DetectionSet, LenientParser, PromptBuilder, SchemaValidator};
use crate::gateway::ImageInput;
use crate::vision::{annotate, load_image_file};

/// Arguments for the detect command
#[derive(Args, Debug)]
pub struct DetectArgs {
    /// Image file path, or an http(s)/data URL
    #[arg(long)]
    pub image: String,

    /// Object type to look for (all visible objects when omitted)
    #[arg(long)]
    pub target: Option<String>,

    /// TOML config file (environment variables still override it)
    #[arg(long, env = "VLM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the configured box encoding (corner / origin-size)
    #[arg(long)]
    pub encoding: Option<BoxEncoding>,

    /// Write a copy of the image with detections drawn on it
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Print detections as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the prompt command
#[derive(Args, Debug)]
pub struct PromptArgs {
    /// Object type to look for
    #[arg(long)]
    pub target: Option<String>,

    /// Box encoding to request
    #[arg(long, default_value = "corner")]
    pub encoding: BoxEncoding,
}

/// Arguments for the parse command
#[derive(Args, Debug)]
pub struct ParseArgs {
    /// File holding the raw model response ("-" for stdin)
    #[arg(long, default_value = "-")]
    pub input: PathBuf,

    /// Box encoding to validate against
    #[arg(long, default_value = "corner")]
    pub encoding: BoxEncoding,
}

/// Arguments for the health command
#[derive(Args, Debug)]
pub struct HealthArgs {
    /// TOML config file
    #[arg(long, env = "VLM_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Image as given on the command line; local files keep their pixels for annotation
fn resolve_image(arg: &str) -> Result<(ImageInput, Option<DynamicImage>)> {
    if let Ok(url) = url::Url::parse(arg) {
        match url.scheme() {
            "http" | "https" | "data" => return Ok((ImageInput::Url(arg.to_string()), None)),
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| anyhow::anyhow!("invalid file URL: {}", arg))?;
                let image = load_image_file(&path)
                    .with_context(|| format!("failed to load image {}", path.display()))?;
                return Ok((ImageInput::Pixels(image.clone()), Some(image)));
            }
            // Anything else (e.g. a Windows drive letter) is treated as a path
            _ => {}
        }
    }

    let image =
        load_image_file(arg).with_context(|| format!("failed to load image {}", arg))?;
    Ok((ImageInput::Pixels(image.clone()), Some(image)))
}

fn print_detections(detections: &DetectionSet, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(detections)?);
        return Ok(());
    }

    if detections.is_empty() {
        println!("No objects detected");
        return Ok(());
    }
    for (i, detection) in detections.iter().enumerate() {
        let (x1, y1, x2, y2) = detection.to_corners();
        println!(
            "{:>3}. {:<16} ({}, {}) - ({}, {})",
            i + 1,
            detection.label().unwrap_or("-"),
            x1,
            y1,
            x2,
            y2
        );
    }
    Ok(())
}

pub async fn detect(args: DetectArgs) -> Result<()> {
    let mut config = DetectorConfig::load(args.config.as_deref())?;
    if let Some(encoding) = args.encoding {
        config.encoding = encoding;
    }

    let (input, pixels) = resolve_image(&args.image)?;
    if args.output.is_some() && pixels.is_none() {
        bail!("--output needs a local image file, got {}", args.image);
    }

    let pipeline = config.build_pipeline()?;
    let detections = pipeline.detect(&input, args.target.as_deref()).await?;
    print_detections(&detections, args.json)?;

    if let (Some(output), Some(image)) = (args.output, pixels) {
        annotate(&image, &detections)
            .save(&output)
            .with_context(|| format!("failed to write {}", output.display()))?;
        info!("Annotated image written to {}", output.display());
    }

    Ok(())
}

pub fn prompt(args: PromptArgs) -> Result<()> {
    let builder = PromptBuilder::for_validator(&SchemaValidator::new(args.encoding));
    println!("{}", builder.build(args.target.as_deref()));
    Ok(())
}

pub fn parse(args: ParseArgs) -> Result<()> {
    let raw = if args.input.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(&args.input)
            .with_context(|| format!("failed to read {}", args.input.display()))?
    };

    let parser = LenientParser::new(SchemaValidator::new(args.encoding));
    let detections = parser.parse(&raw)?;
    print_detections(&detections, true)
}

pub async fn health(args: HealthArgs) -> Result<()> {
    let config = DetectorConfig::load(args.config.as_deref())?;
    let gateway = config.build_gateway()?;

    if gateway.health_check().await {
        println!(
            "✅ {} backend at {} is reachable (model {})",
            gateway.backend(),
            config.gateway.base_url(),
            gateway.model_name()
        );
        Ok(())
    } else {
        bail!(
            "{} backend at {} is not reachable",
            gateway.backend(),
            config.gateway.base_url()
        )
    }
}
