use std::fs;

use anyhow::Context;
use log::{debug, info};
use structopt::StructOpt;

use anyka::ak::{env, PartitionTable};
use anyka::output;

mod cli;

/// Splits the firmware image into its partitions and writes them into the
/// output folder together with the partition table report.
fn dissect(opts: &cli::Opts) -> Result<(), anyhow::Error> {
    output::prepare_folder(&opts.output_folder, opts.force)?;

    let image = fs::read(&opts.input_file)
        .with_context(|| format!("Failed to read image file '{}'", opts.input_file.display()))?;

    info!("Read {} bytes from {}", image.len(), opts.input_file.display());

    let table = PartitionTable::from_image(&image)?;

    info!("Found {} partitions", table.len());

    // Write the partition table report
    let report_path = opts.output_folder.join("partition_table.txt");

    fs::write(&report_path, table.to_string())
        .with_context(|| format!("Failed to write '{}'", report_path.display()))?;

    // Write the raw content of every partition
    for partition in table.partitions() {
        let path = opts.output_folder.join(format!("{}.bin", partition.name));

        fs::write(&path, &partition.data)
            .with_context(|| format!("Failed to write partition '{}'", partition.name))?;

        debug!("Wrote {} bytes to {}", partition.data.len(), path.display());
    }

    // Decode every environment partition into readable text
    let env_partitions = table
        .partitions()
        .iter()
        .filter(|partition| partition.name.starts_with(env::NAME_PREFIX));

    for partition in env_partitions {
        let text = env::decode(&partition.data).with_context(|| {
            format!("Failed to decode environment partition '{}'", partition.name)
        })?;

        let path = opts.output_folder.join(format!("{}.txt", partition.name));

        fs::write(&path, text)
            .with_context(|| format!("Failed to write '{}'", path.display()))?;

        debug!("Decoded environment partition to {}", path.display());
    }

    Ok(())
}

fn main() -> Result<(), anyhow::Error> {
    // Create a logger with timestamps
    pretty_env_logger::init_timed();

    // Parse the command-line arguments
    let opts = cli::Opts::from_args();

    dissect(&opts)
}
