//! Parser/printer adapter (C2)
//!
//! Wraps the `swc_ecma_parser` / `swc_ecma_codegen` pair in the most
//! permissive configuration this crate needs: script-or-module source,
//! JSX accepted as a superset, and an error-recovering lexer so the pass
//! pipeline still gets a tree for inputs with minor syntax hiccups.

use swc_common::comments::SingleThreadedComments;
use swc_common::{sync::Lrc, FileName, SourceMap};
use swc_ecma_ast::Program;
use swc_ecma_codegen::text_writer::JsWriter;
use swc_ecma_codegen::{Config as CodegenConfig, Emitter};
use swc_ecma_parser::lexer::Lexer;
use swc_ecma_parser::{EsConfig, Parser as SwcParser, StringInput, Syntax};

use crate::error::Error;

/// A parsed tree plus the bookkeeping the printer needs to reproduce
/// comments and double-quoted, minimally escaped string output.
pub struct ParsedProgram {
    pub program: Program,
    source_map: Lrc<SourceMap>,
    comments: SingleThreadedComments,
}

/// Parses `source` as an ECMAScript script or module, in recovery mode.
pub fn parse(source: &str) -> Result<ParsedProgram, Error> {
    let source_map: Lrc<SourceMap> = Default::default();
    let file = source_map.new_source_file(FileName::Custom("input.js".into()), source.to_string());
    let comments = SingleThreadedComments::default();

    let syntax = Syntax::Es(EsConfig {
        jsx: true,
        ..Default::default()
    });
    let lexer = Lexer::new(
        syntax,
        Default::default(),
        StringInput::from(&*file),
        Some(&comments),
    );
    let mut parser = SwcParser::new_from(lexer);

    let program = parser
        .parse_program()
        .map_err(|e| Error::Parse(format!("{e:?}")))?;

    for recovered in parser.take_errors() {
        log::warn!("parser recovered from a syntax error: {recovered:?}");
    }

    Ok(ParsedProgram {
        program,
        source_map,
        comments,
    })
}

/// Emits `parsed` back to source: double-quoted strings, minimal escapes,
/// comments preserved.
pub fn print(parsed: &ParsedProgram) -> Result<String, Error> {
    let mut buf = Vec::new();
    {
        let writer = JsWriter::new(parsed.source_map.clone(), "\n", &mut buf, None);
        let mut emitter = Emitter {
            cfg: CodegenConfig::default(),
            cm: parsed.source_map.clone(),
            comments: Some(&parsed.comments),
            wr: writer,
        };
        emitter
            .emit_program(&parsed.program)
            .map_err(|e| Error::Print(e.to_string()))?;
    }
    String::from_utf8(buf).map_err(|e| Error::Print(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_trivial_source() {
        let parsed = parse("var x = 1;").expect("parse failed");
        let printed = print(&parsed).expect("print failed");
        assert!(printed.contains('1'));
        // Re-parsing the printed output must also succeed.
        parse(&printed).expect("re-parse failed");
    }

    #[test]
    fn roundtrips_jsx_superset() {
        let parsed = parse("const el = <div id=\"x\">hi</div>;").expect("parse failed");
        print(&parsed).expect("print failed");
    }
}
