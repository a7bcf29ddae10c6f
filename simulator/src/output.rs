use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use pmtsim_common::EventNumber;
use pmtsim_response::OutWave;

/// Write one finished waveform as delimited text: a header carrying the
/// four geometry parameters, then one `time,sample` row per sample.
pub(crate) fn save_waveform(directory: &Path, event: EventNumber, wave: &OutWave) -> Result<()> {
    let path = directory.join(format!("waveform-{event:06}.csv"));
    let file = File::create(&path)
        .with_context(|| format!("creating waveform file {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    let params = wave.params();
    writeln!(
        writer,
        "# period={} gain={} num-samples={} delay={}",
        params.period, params.gain, params.num_samples, params.delay
    )?;
    for (index, sample) in wave.samples().iter().enumerate() {
        writeln!(writer, "{},{}", wave.time_of_sample(index), sample)?;
    }
    writer.flush()?;
    Ok(())
}
