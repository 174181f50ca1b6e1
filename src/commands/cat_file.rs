use std::fs::File;
use std::io::BufReader;

use anyhow::Context;
use flate2::read::ZlibDecoder;

use crate::object::ObjectFile;

/// `git cat-file (-t|-s|-p)` command.
pub fn invoke(hash: &str, type_only: bool, size_only: bool) -> anyhow::Result<()> {
    let mut object = ObjectFile::<BufReader<ZlibDecoder<File>>>::read(hash, None)?;

    if type_only {
        println!("{}", object.header.typ);
        return Ok(());
    }

    if size_only {
        println!("{}", object.header.size);
        return Ok(());
    }

    let mut stdout = std::io::stdout().lock();
    std::io::copy(&mut object.reader, &mut stdout).context("streaming object content to stdout")?;

    Ok(())
}
