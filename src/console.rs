//! Handling the plpower CLI
//!
//! This module handles the command line parsing as well as basic information (e.g. help dialog, version information, etc.).
use crate::{
    error::{PlError, PlResult},
    get_version,
};
use clap::{builder::Str, Parser};
use rprompt::prompt_reply_from_bufread;
use std::{
    io::{stdin, stdout, BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

/// Command line arguments for the plpower application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    /// file path of the power series, which should be analyzed
    pub series_path: PathBuf,
    /// optional analysis configuration (YAML)
    pub config_path: Option<PathBuf>,
    /// destination directory of the results. if not defined, the directory of the series file is used
    pub output_directory: PathBuf,
    /// topmost directory searched for dark spectra and power calibrations. overrides the configuration.
    pub root_boundary: Option<PathBuf>,
}

#[derive(Parser, Debug, Default)]
#[command(author, version = Str::from(&get_version()), about, long_about = None)]
pub struct PartialArgs {
    /// filepath of the power series to analyze
    #[arg(short, long)]
    series: Option<String>,
    /// analysis configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,
    /// destination directory of the results. if not defined, same directory as the series file is used
    #[arg(short, long)]
    output: Option<String>,
    /// topmost directory searched for auxiliary files (dark spectra, power calibrations)
    #[arg(short, long)]
    root_boundary: Option<String>,
}

fn eval_series_input(series_path: &str) -> Option<PathBuf> {
    let path = Path::new(series_path);
    if path.is_file() {
        Some(path.to_path_buf())
    } else {
        None
    }
}

/// Evaluates if the passed output-directory string is valid.
///
/// An empty string is valid and is replaced by the directory of the series file later on.
fn eval_output_input(output_path: &str) -> Option<PathBuf> {
    let path = Path::new(output_path);
    if path.is_dir() {
        Some(path.to_path_buf())
    } else if output_path.is_empty() {
        Some(PathBuf::new())
    } else {
        None
    }
}

/// Creates the prompt string for the argument `flag` ("s" for the series file, "o" for the output
/// directory), prepended by `init_str`.
///
/// # Errors
///
/// Errors if an invalid flag type has been used
fn create_prompt_str(flag: &str, init_str: &str) -> PlResult<String> {
    let prompt_str = init_str.to_owned();
    match flag {
        "s" => Ok(prompt_str + "Please insert path to the power series file:\n"),
        "o" => Ok(prompt_str
            + "Please insert an output directory or nothing to select the same directory as the power series file\n"),
        _ => Err(PlError::Console(
            "Invalid flag type! Cannot create prompt string!".into(),
        )),
    }
}

/// Extracts an argument from the [`PartialArgs`] struct, asking on `reader` as long as the
/// argument is missing or invalid.
///
/// # Errors
///
/// Returns an [`PlError::Console`] if reading the answer fails.
fn get_args<T>(
    func: fn(&str) -> Option<T>,
    input: Option<&str>,
    arg_flag: &str,
    reader: &mut impl BufRead,
    writer: &mut impl Write,
) -> PlResult<T> {
    let init_str = match input {
        Some(i) => match func(i) {
            Some(arg) => return Ok(arg),
            None => "Invalid input!\n",
        },
        None => "",
    };
    let prompt_str = create_prompt_str(arg_flag, init_str)?;
    let input = prompt_reply_from_bufread(reader, writer, prompt_str)
        .map_err(|e| PlError::Console(format!("reading input failed: {e}")))?;
    get_args(func, Some(input.as_str()), arg_flag, reader, writer)
}

fn get_parent_dir(path: &Path) -> PathBuf {
    path.parent().map_or_else(PathBuf::new, Path::to_path_buf)
}

impl Args {
    /// Complete the given [`PartialArgs`] by asking for missing values on `reader`.
    ///
    /// # Errors
    ///
    /// This function will return an error if reading from `reader` fails.
    pub fn from_partial(
        part_args: PartialArgs,
        reader: &mut impl BufRead,
        writer: &mut impl Write,
    ) -> PlResult<Self> {
        let series_path = get_args(
            eval_series_input,
            part_args.series.as_deref(),
            "s",
            reader,
            writer,
        )?;
        let output_directory = get_args(
            eval_output_input,
            part_args.output.as_deref(),
            "o",
            reader,
            writer,
        )?;
        let output_directory = if output_directory.as_os_str().is_empty() {
            get_parent_dir(&series_path)
        } else {
            output_directory
        };
        Ok(Self {
            series_path,
            config_path: part_args.config.map(PathBuf::from),
            output_directory,
            root_boundary: part_args.root_boundary.map(PathBuf::from),
        })
    }
}

impl TryFrom<PartialArgs> for Args {
    type Error = PlError;
    fn try_from(part_args: PartialArgs) -> PlResult<Self> {
        let mut reader = BufReader::new(stdin().lock());
        let mut writer = BufWriter::new(stdout().lock());
        show_intro();
        let args = Self::from_partial(part_args, &mut reader, &mut writer)?;
        println!("Power series file: {}", args.series_path.display());
        println!("Output directory: {}", args.output_directory.display());
        Ok(args)
    }
}

fn create_intro() -> String {
    format!(
        "{: ^80}\n{: ^80}\n",
        "plpower - photoluminescence power series peak tracking",
        "version ".to_owned() + &get_version()
    )
}

/// Show the program name and version information.
pub fn show_intro() {
    println!("{}", create_intro());
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::BufReader;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn eval_series_input_test() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        assert_eq!(eval_series_input(path), Some(PathBuf::from(path)));
        assert_eq!(eval_series_input("./invalid_file_path/series.origin"), None);
        let dir = TempDir::new().unwrap();
        assert_eq!(eval_series_input(dir.path().to_str().unwrap()), None);
    }
    #[test]
    fn eval_output_input_test() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_str().unwrap();
        assert_eq!(eval_output_input(""), Some(PathBuf::new()));
        assert_eq!(eval_output_input(path), Some(PathBuf::from(path)));
        assert_eq!(eval_output_input("non_existent_path/still_not_existent/"), None);
    }
    #[test]
    fn get_parent_dir_test() {
        assert_eq!(
            get_parent_dir(Path::new("./data/series.origin")),
            PathBuf::from("./data")
        );
    }
    #[test]
    fn create_prompt_str_test() {
        assert_eq!(
            create_prompt_str("s", "test_str\r\n").unwrap(),
            "test_str\r\nPlease insert path to the power series file:\n"
        );
        assert_eq!(create_prompt_str("o", "").unwrap(), "Please insert an output directory or nothing to select the same directory as the power series file\n");
        assert_matches!(create_prompt_str("invalid_flag", ""), Err(PlError::Console(_)));
    }
    #[test]
    fn get_args_test() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_str().unwrap();
        let input = format!("nothing/here\n{path}\n");
        let mut reader = BufReader::new(input.as_bytes());
        let mut output = Vec::new();
        let arg = get_args(eval_output_input, None, "o", &mut reader, &mut output).unwrap();
        assert_eq!(arg, PathBuf::from(path));
        let text = String::from_utf8(output).unwrap();
        assert!(text.starts_with("Please insert an output directory"));
        assert!(text.contains("Invalid input!\n"));
    }
    #[test]
    fn get_args_no_input() {
        let mut reader = BufReader::new("".as_bytes());
        let mut output = Vec::new();
        assert_matches!(
            get_args(eval_series_input, None, "s", &mut reader, &mut output),
            Err(PlError::Console(_))
        );
    }
    #[test]
    fn from_partial() {
        let file = NamedTempFile::new().unwrap();
        let series = file.path().to_str().unwrap().to_owned();
        let part_args = PartialArgs {
            series: Some(series.clone()),
            config: Some("analysis.yaml".into()),
            output: Some(String::new()),
            root_boundary: None,
        };
        let mut reader = BufReader::new("".as_bytes());
        let mut output = Vec::new();
        let args = Args::from_partial(part_args, &mut reader, &mut output).unwrap();
        assert_eq!(args.series_path, PathBuf::from(&series));
        assert_eq!(args.config_path, Some(PathBuf::from("analysis.yaml")));
        assert_eq!(args.output_directory, get_parent_dir(file.path()));
        assert_eq!(args.root_boundary, None);
        assert!(output.is_empty());
    }
    #[test]
    fn from_partial_prompted() {
        let file = NamedTempFile::new().unwrap();
        let series = file.path().to_str().unwrap().to_owned();
        let dir = TempDir::new().unwrap();
        let out = dir.path().to_str().unwrap().to_owned();
        let part_args = PartialArgs {
            root_boundary: Some("/data".into()),
            ..Default::default()
        };
        let input = format!("{series}\n{out}\n");
        let mut reader = BufReader::new(input.as_bytes());
        let mut output = Vec::new();
        let args = Args::from_partial(part_args, &mut reader, &mut output).unwrap();
        assert_eq!(args.series_path, PathBuf::from(series));
        assert_eq!(args.output_directory, PathBuf::from(out));
        assert_eq!(args.root_boundary, Some(PathBuf::from("/data")));
        assert_eq!(args.config_path, None);
    }
    #[test]
    fn intro() {
        let intro = create_intro();
        assert!(intro.contains("plpower - photoluminescence power series peak tracking"));
        assert!(intro.contains(&format!("version {}", get_version())));
    }
}
