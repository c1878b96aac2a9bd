use anyhow::{Context, anyhow};
use ffmpeg_next::{format, frame, media};
use tracing::{debug, error, info};
use vaccel_core::{
    AccelerationConfig, BackendCatalog, ComputeContext, Direction, SessionRequest,
    compute::NoCompute, interop::NativeFrame, open_accelerated,
};
use vaccel_ffmpeg::{
    FfmpegCodecRegistry, FfmpegHwContext, HwDecoder, HwFrame, format::codec_id,
};

use crate::{config::SampleConfig, fps_counter::FpsCounter};

/// Decodes the video stream of the configured input with the best available
/// acceleration and reports the decoding speed.
pub fn run(config: &SampleConfig) -> anyhow::Result<()> {
    ffmpeg_next::init()?;

    let mut input = format::input(&config.input)
        .with_context(|| format!("Failed to open {}", config.input.display()))?;
    let stream = input
        .streams()
        .best(media::Type::Video)
        .ok_or_else(|| anyhow!("No video stream in {}", config.input.display()))?;
    let stream_index = stream.index();
    let parameters = stream.parameters();

    let catalog = BackendCatalog::detect();
    let acceleration_config = AccelerationConfig::from_env(Direction::Decode);
    let mut compute = ComputeContext::new(NoCompute);
    let request = SessionRequest {
        codec_id: codec_id(parameters.id()),
        direction: Direction::Decode,
        acceleration: config.acceleration,
        device_index: config.device_index,
        use_compute: false,
        config: &acceleration_config,
    };

    let opened = open_accelerated(
        &FfmpegHwContext,
        &mut compute,
        &catalog,
        &FfmpegCodecRegistry,
        &request,
        |attempt| {
            let ctx = ffmpeg_next::codec::Context::from_parameters(parameters.clone())?;
            HwDecoder::open(
                ctx,
                attempt.codec.codec.handle.clone(),
                attempt.device,
                attempt.codec.codec.hw_configs.clone(),
                catalog,
            )
        },
    )?;
    if opened.device.is_some() {
        info!(
            device_index = opened.device_index.as_raw(),
            "Video acceleration device initialized: {}", opened.acceleration
        );
    } else {
        info!("Video acceleration device not available");
    }

    let mut decoder = opened.value;
    let mut fps_counter = FpsCounter::new(config.fps_interval);
    let mut frame = frame::Video::empty();
    let mut logged_surface = false;

    for (stream, packet) in input.packets() {
        if stream.index() != stream_index {
            continue;
        }
        if let Err(err) = decoder.send_packet(&packet) {
            error!("Failed to send a packet to decoder: {err}");
            continue;
        }
        receive_frames(&mut decoder, &mut frame, &mut fps_counter, &mut logged_surface);
    }

    decoder.send_eof()?;
    receive_frames(&mut decoder, &mut frame, &mut fps_counter, &mut logged_surface);
    info!("End of stream");
    Ok(())
}

fn receive_frames(
    decoder: &mut HwDecoder,
    frame: &mut frame::Video,
    fps_counter: &mut FpsCounter,
    logged_surface: &mut bool,
) {
    loop {
        match decoder.receive_frame(frame) {
            Ok(()) => {
                if !*logged_surface {
                    let surface = HwFrame(frame).surface();
                    debug!(?surface, hardware = decoder.is_hardware(), "First decoded frame.");
                    *logged_surface = true;
                }
                fps_counter.new_frame();
            }
            Err(ffmpeg_next::Error::Eof) => break,
            Err(ffmpeg_next::Error::Other {
                errno: ffmpeg_next::error::EAGAIN,
            }) => break,
            Err(err) => {
                error!("Decoder error: {err}.");
                break;
            }
        }
    }
}
