use clap::{arg, crate_version, Command};
use unpacker_js::{deobfuscate_with_options, RunOptions};

const RCH: &str = "unreachable was reached";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let long_help =
"Examples:
---------
Deobfuscate:   `unpacker-js deobfuscate -i packed.js -o clean.js`";

    let mut main_cmd = Command::new("unpacker-js")
        .about("Inline array/string-table/resolver obfuscation in a script")
        .after_long_help(long_help)
        .version(crate_version!());
    main_cmd = main_cmd.subcommand(Command::new("deobfuscate")
        .arg(arg!(-i --input <PATH> "input path").required(true))
        .arg(arg!(-o --output <PATH> "output path").required(true))
        .arg(arg!(-v --verbose "raise the log level to debug").required(false))
        .about("unwraps array/string-table/resolver indirection in a script"));

    let matches = main_cmd.get_matches();

    if let Some(cmd) = matches.subcommand_matches("deobfuscate") {
        let path_in = cmd.get_one::<String>("input").expect(RCH);
        let path_out = cmd.get_one::<String>("output").expect(RCH);
        let verbose = cmd.get_flag("verbose");

        let mut builder = env_logger::Builder::from_default_env();
        if verbose {
            builder.filter_level(log::LevelFilter::Debug);
        }
        builder.init();

        let source = std::fs::read_to_string(path_in)?;
        let (output, stats) = deobfuscate_with_options(&source, &RunOptions::default())?;
        std::fs::write(path_out, output)?;
        log::info!(
            "inlined {} array accesses, {} decoder calls, {} resolver calls, {} constant folds, {} property accesses simplified",
            stats.array_accesses_inlined,
            stats.decoder_calls_inlined,
            stats.resolver_calls_inlined,
            stats.constant_folds,
            stats.property_accesses_simplified,
        );
    }

    Ok(())
}
