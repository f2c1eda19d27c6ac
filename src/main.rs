//! fixwave: a fixed-point polyphonic MIDI synthesizer.
//!
//! The engine renders on the main thread and back-pressures on the frame
//! queue that the audio device drains; MIDI input arrives on the midir
//! callback thread through the engine's bounded message queue. One MIDI
//! message is dispatched per rendered frame, mirroring the cooperative
//! foreground loop of the embedded design.

mod audio;

use clap::{App, Arg};
use crossbeam::queue::ArrayQueue;
use failure::{err_msg, Error};
use midir::{Ignore, MidiInput, MidiInputConnection};

use fixwave_core::midi::Message;
use fixwave_core::{Config, Synth};

use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> Result<(), Error> {
    env_logger::init();

    let matches = App::new("fixwave")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A fixed-point polyphonic MIDI synthesizer")
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .takes_value(true)
                .help("MIDI input port index (defaults to the first port)"),
        )
        .arg(
            Arg::with_name("list")
                .short("l")
                .long("list")
                .help("List MIDI input ports and exit"),
        )
        .arg(
            Arg::with_name("demo")
                .long("demo")
                .help("Play a short built-in sequence instead of reading MIDI input"),
        )
        .get_matches();

    if matches.is_present("list") {
        return list_midi_ports();
    }

    let port = matches
        .value_of("port")
        .map(|s| s.parse::<usize>())
        .transpose()
        .map_err(|e| err_msg(format!("invalid port index: {}", e)))?;

    let output = audio::start()?;
    let mut synth = Box::new(Synth::with_config(Config {
        sample_rate: output.sample_rate,
        env_update_period: None,
    })?);
    let queue = synth.midi_queue();

    let mut demo = None;
    let mut _midi_conn: Option<MidiInputConnection<()>> = None;
    if matches.is_present("demo") {
        demo = Some(DemoSequencer::new(output.sample_rate));
    } else {
        _midi_conn = Some(open_midi_input(port, queue.clone())?);
    }

    // One dispatched message and one rendered frame per iteration; the
    // frame queue provides the pacing.
    let mut rendered: u64 = 0;
    loop {
        synth.dispatch_one();

        if let Some(seq) = demo.as_mut() {
            seq.pump(rendered, &queue);
            if seq.finished(rendered) {
                break;
            }
        }

        let frame = synth.render_frame().to_word();
        while output.frames.push(frame).is_err() {
            thread::sleep(Duration::from_micros(500));
        }
        rendered += 1;
    }

    // Let the device drain the queued tail before tearing the stream down.
    thread::sleep(Duration::from_millis(200));
    Ok(())
}

fn list_midi_ports() -> Result<(), Error> {
    let input = MidiInput::new("fixwave")?;
    let ports = input.ports();
    if ports.is_empty() {
        println!("no MIDI input ports");
        return Ok(());
    }
    for (i, port) in ports.iter().enumerate() {
        println!(
            "{}: {}",
            i,
            input.port_name(port).unwrap_or_else(|_| "<unknown>".into())
        );
    }
    Ok(())
}

fn open_midi_input(
    port: Option<usize>,
    queue: Arc<ArrayQueue<Message>>,
) -> Result<MidiInputConnection<()>, Error> {
    let mut input = MidiInput::new("fixwave")?;
    input.ignore(Ignore::None);

    let ports = input.ports();
    let index = port.unwrap_or(0);
    let port = ports
        .get(index)
        .ok_or_else(|| err_msg(format!("MIDI input port {} not found", index)))?;
    let name = input
        .port_name(port)
        .unwrap_or_else(|_| "<unknown>".into());
    log::info!("listening on MIDI port {}: {}", index, name);

    input
        .connect(
            port,
            "fixwave-in",
            move |_timestamp, bytes, _| {
                if bytes.is_empty() {
                    return;
                }
                let mut raw = [0u8; 3];
                for (dst, src) in raw.iter_mut().zip(bytes.iter()) {
                    *dst = *src;
                }
                if queue.push(Message::decode(raw)).is_err() {
                    log::warn!("MIDI queue full, dropping message");
                }
            },
            (),
        )
        .map_err(|e| err_msg(e.to_string()))
}

/// Frame-timed event list for `--demo`: a short arpeggio and chord on the
/// default piano preset.
struct DemoSequencer {
    events: Vec<(u64, [u8; 3])>,
    next: usize,
    end: u64,
}

impl DemoSequencer {
    fn new(sample_rate: u32) -> DemoSequencer {
        let beat = u64::from(sample_rate) / 4;
        let mut events = Vec::new();
        for (i, note) in [60u8, 64, 67, 72].iter().enumerate() {
            let at = i as u64 * beat;
            events.push((at, [0x90, *note, 100]));
            events.push((at + beat, [0x80, *note, 0]));
        }
        let chord_at = 5 * beat;
        for note in &[60u8, 64, 67] {
            events.push((chord_at, [0x90, *note, 90]));
            events.push((chord_at + 4 * beat, [0x80, *note, 0]));
        }
        events.sort_by_key(|e| e.0);

        let last = events.last().map(|e| e.0).unwrap_or(0);
        DemoSequencer {
            events,
            next: 0,
            // Two seconds of release and reverb tail.
            end: last + 2 * u64::from(sample_rate),
        }
    }

    fn pump(&mut self, now: u64, queue: &ArrayQueue<Message>) {
        while self.next < self.events.len() && self.events[self.next].0 <= now {
            let (_, raw) = self.events[self.next];
            if queue.push(Message::decode(raw)).is_err() {
                log::warn!("MIDI queue full, dropping demo event");
            }
            self.next += 1;
        }
    }

    fn finished(&self, now: u64) -> bool {
        self.next >= self.events.len() && now >= self.end
    }
}
