use celt_quant::{
    math::compute_snr, EncodedFrame, Error, FrameConfig, FrameDecoder, FrameEncoder, Mode, Packet,
    Result, Spread,
};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;
use std::{fs::File, io::BufReader, io::BufWriter, str::FromStr, time::Instant};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn config_args<'a, 'b>() -> Vec<Arg<'a, 'b>> {
    vec![
        Arg::with_name("rate")
            .long("rate")
            .takes_value(true)
            .default_value("48000")
            .help("sample rate in Hz"),
        Arg::with_name("frame-size")
            .long("frame-size")
            .takes_value(true)
            .default_value("960")
            .help("samples per channel of the longest frame"),
        Arg::with_name("channels")
            .long("channels")
            .short("c")
            .takes_value(true)
            .default_value("1"),
        Arg::with_name("lm")
            .long("lm")
            .takes_value(true)
            .help("log2 of the number of short blocks, defaults to the mode's largest"),
        Arg::with_name("bytes")
            .long("bytes")
            .short("b")
            .takes_value(true)
            .default_value("160")
            .help("bytes per frame"),
        Arg::with_name("complexity")
            .long("complexity")
            .takes_value(true)
            .default_value("5"),
        Arg::with_name("spread")
            .long("spread")
            .takes_value(true)
            .possible_values(&["none", "light", "normal", "aggressive"])
            .default_value("normal"),
        Arg::with_name("trim")
            .long("trim")
            .takes_value(true)
            .default_value("5"),
        Arg::with_name("intensity")
            .long("intensity")
            .takes_value(true)
            .help("first band coded as intensity stereo"),
        Arg::with_name("dual-stereo").long("dual-stereo"),
        Arg::with_name("disable-inv").long("disable-inv"),
        Arg::with_name("transient").long("transient"),
        Arg::with_name("frames")
            .long("frames")
            .short("n")
            .takes_value(true)
            .default_value("50"),
        Arg::with_name("seed")
            .long("seed")
            .takes_value(true)
            .default_value("42"),
    ]
}

fn run() -> Result<()> {
    let matches = App::new("celt_quant")
        .version(env!("CARGO_PKG_VERSION"))
        .about("CELT-style band quantization over random spectra")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("roundtrip")
                .about("encodes random spectra, decodes them and reports the reconstruction")
                .args(&config_args())
                .arg(
                    Arg::with_name("output")
                        .long("output")
                        .short("o")
                        .takes_value(true)
                        .help("also save the coded frames as a packet"),
                ),
        )
        .subcommand(
            SubCommand::with_name("bench")
                .about("encodes independent streams in parallel")
                .args(&config_args())
                .arg(
                    Arg::with_name("streams")
                        .long("streams")
                        .takes_value(true)
                        .default_value("8"),
                ),
        )
        .subcommand(
            SubCommand::with_name("inspect")
                .about("prints the allocation of every frame in a packet")
                .arg(Arg::with_name("input").required(true).index(1)),
        )
        .get_matches();

    match matches.subcommand() {
        ("roundtrip", Some(sub)) => roundtrip(sub),
        ("bench", Some(sub)) => bench(sub),
        ("inspect", Some(sub)) => inspect(sub),
        _ => Ok(()),
    }
}

fn parse<T: FromStr>(matches: &ArgMatches, name: &str) -> Result<T> {
    let raw = matches
        .value_of(name)
        .ok_or_else(|| Error::InvalidArgument(format!("missing --{}", name)))?;
    raw.parse::<T>()
        .map_err(|_| Error::InvalidArgument(format!("--{} got '{}'", name, raw)))
}

fn build_mode(matches: &ArgMatches) -> Result<Mode> {
    let rate = parse::<i32>(matches, "rate")?;
    let frame_size = parse::<i32>(matches, "frame-size")?;
    if rate == 48_000 && frame_size == 960 {
        Ok(Mode::standard().clone())
    } else {
        Mode::custom(rate, frame_size)
    }
}

fn build_config(mode: &Mode, matches: &ArgMatches) -> Result<FrameConfig> {
    let mut config = FrameConfig::new(mode)
        .with_channels(parse(matches, "channels")?)
        .with_bytes_per_frame(parse(matches, "bytes")?)
        .with_complexity(parse(matches, "complexity")?)
        .with_transient(matches.is_present("transient"));
    if matches.is_present("lm") {
        config.lm = parse(matches, "lm")?;
    }
    if matches.is_present("intensity") {
        config.intensity = parse(matches, "intensity")?;
    }
    config.alloc_trim = parse(matches, "trim")?;
    config.spread = match matches.value_of("spread") {
        Some("none") => Spread::None,
        Some("light") => Spread::Light,
        Some("aggressive") => Spread::Aggressive,
        _ => Spread::Normal,
    };
    config.dual_stereo = matches.is_present("dual-stereo");
    config.disable_inv = matches.is_present("disable-inv");
    config.validate(mode)?;
    Ok(config)
}

/// # Description
/// One frame of noise per channel with a falling spectral tilt.
/// Bins past the last coded band stay zero.
fn random_spectrum(mode: &Mode, config: &FrameConfig, rng: &mut StdRng) -> Vec<f32> {
    let n = mode.frame_size(config.lm);
    let top = (i32::from(mode.ebands[config.end]) << config.lm) as usize;
    let mut freq = vec![0.0; config.channels * n];
    for channel in freq.chunks_mut(n) {
        for (k, v) in channel.iter_mut().enumerate().take(top) {
            *v = rng.gen_range(-1.0f32..1.0) / (1.0 + k as f32 / 32.0);
        }
    }
    freq
}

fn roundtrip(matches: &ArgMatches) -> Result<()> {
    let mode = build_mode(matches)?;
    let config = build_config(&mode, matches)?;
    let frames = parse::<usize>(matches, "frames")?;
    let mut rng = StdRng::seed_from_u64(parse(matches, "seed")?);

    let mut encoder = FrameEncoder::new(&mode, config.clone())?;
    let mut decoder = FrameDecoder::new(&mode, config.clone())?;
    let mut packet = Packet::new(&mode, config.clone());
    let mut snr_sum = 0.0;
    let mut mismatches = 0;

    for k in 0..frames {
        let freq = random_spectrum(&mode, &config, &mut rng);
        let coded = encoder.encode_spectrum(&freq)?;
        let decoded = decoder.decode(&coded)?;
        let snr = compute_snr(&freq, &decoded.spectrum);
        let in_sync = decoded.info.final_range == coded.final_range;
        if !in_sync {
            mismatches += 1;
        }
        println!(
            "frame {:4}: snr={:6.2}dB bits={:5} coded_bands={:2} range={:#010x} {}",
            k,
            snr,
            encoder.info().bits_used,
            encoder.info().allocation.coded_bands,
            coded.final_range,
            if in_sync { "ok" } else { "MISMATCH" }
        );
        snr_sum += snr;
        packet.push(coded);
    }

    println!(
        "{} frames, {} bytes, mean snr {:.2}dB, {} range mismatches",
        packet.len(),
        packet.payload_bytes(),
        snr_sum / frames.max(1) as f32,
        mismatches
    );
    if let Some(path) = matches.value_of("output") {
        let file = File::create(path).map_err(|e| Error::Packet(e.to_string()))?;
        packet.save_to(BufWriter::new(file))?;
        println!("packet written to {}", path);
    }
    Ok(())
}

fn bench(matches: &ArgMatches) -> Result<()> {
    let mode = build_mode(matches)?;
    let config = build_config(&mode, matches)?;
    let frames = parse::<usize>(matches, "frames")?;
    let streams = parse::<usize>(matches, "streams")?;
    let seed = parse::<u64>(matches, "seed")?;

    let inputs = (0..streams)
        .map(|s| {
            let mut rng = StdRng::seed_from_u64(seed + s as u64);
            (0..frames)
                .map(|_| random_spectrum(&mode, &config, &mut rng))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    let clock = Instant::now();
    let coded = inputs
        .par_iter()
        .map(|stream| {
            let mut encoder = FrameEncoder::new(&mode, config.clone())?;
            stream
                .iter()
                .map(|freq| encoder.encode_spectrum(freq))
                .collect::<Result<Vec<EncodedFrame>>>()
        })
        .collect::<Result<Vec<_>>>()?;
    let elapsed = clock.elapsed().as_secs_f64();

    let total_frames = streams * frames;
    let bytes = coded.iter().flatten().map(|f| f.data.len()).sum::<usize>();
    let audio_secs = total_frames as f64 * mode.frame_size(config.lm) as f64 / f64::from(mode.sample_rate);
    println!(
        "{} streams x {} frames in {:.3}s: {:.1} frames/s, {:.1}x realtime, {} bytes",
        streams,
        frames,
        elapsed,
        total_frames as f64 / elapsed.max(1e-9),
        audio_secs / elapsed.max(1e-9),
        bytes
    );
    Ok(())
}

fn inspect(matches: &ArgMatches) -> Result<()> {
    let path = matches
        .value_of("input")
        .ok_or_else(|| Error::InvalidArgument("missing input".to_string()))?;
    let file = File::open(path).map_err(|e| Error::Packet(e.to_string()))?;
    let packet = Packet::load(BufReader::new(file))?;
    let mode = packet.mode()?;
    println!(
        "{}Hz, {} samples, {} channels, lm={}, {} frames of {} bytes",
        packet.sample_rate,
        packet.frame_size,
        packet.config.channels,
        packet.config.lm,
        packet.len(),
        packet.config.bytes_per_frame
    );

    let mut decoder = FrameDecoder::new(&mode, packet.config.clone())?;
    for (k, frame) in packet.frames.iter().enumerate() {
        let decoded = decoder.decode(frame)?;
        let info = &decoded.info;
        println!(
            "frame {:4}: transient={} spread={:?} trim={} coded_bands={} intensity={} dual={} anti_collapse={} range {}",
            k,
            info.transient,
            info.spread.unwrap_or(Spread::Normal),
            info.alloc_trim,
            info.allocation.coded_bands,
            info.allocation.intensity,
            info.allocation.dual_stereo,
            info.anti_collapse,
            if info.final_range == frame.final_range { "ok" } else { "MISMATCH" }
        );
        println!("    pulses: {:?}", &info.allocation.pulses[..info.allocation.coded_bands]);
    }
    Ok(())
}
