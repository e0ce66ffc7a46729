use std::path::PathBuf;

use structopt::StructOpt;

/// Dissect an Anyka firmware image into its partitions.
///
/// Works on images for the SCD92x (parent image only), SCD88x and SCD89x
/// families.
#[derive(StructOpt, Debug)]
pub struct Opts {
    /// Delete the output folder first if it exists and contains data
    #[structopt(short = "f", long = "force")]
    pub force: bool,

    /// Path to the input image file
    #[structopt(parse(from_os_str))]
    pub input_file: PathBuf,

    /// Path to the output directory
    #[structopt(parse(from_os_str))]
    pub output_folder: PathBuf,
}
