mod swap_file;

use std::error::Error;

use log::info;
use pager::{LruPageReplacer, Mmu, PagingEvent};

use swap_file::SwapFile;

const PAGE_SIZE: usize = 256;
const FRAME_COUNT: usize = 2;
const PAGE_COUNT: usize = 256;

type DemoMmu = Mmu<
    PAGE_SIZE,
    FRAME_COUNT,
    PAGE_COUNT,
    LruPageReplacer,
    SwapFile<PAGE_COUNT, PAGE_SIZE>,
>;

fn dump_page(mmu: &mut DemoMmu, page_number: u32) -> pager::Result<String> {
    let base = page_number * PAGE_SIZE as u32;

    let bytes = (base..base + 16)
        .map(|address| mmu.read(address))
        .collect::<pager::Result<Vec<u8>>>()?;

    Ok(hex::encode(bytes))
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "./swapfile.bin".to_owned());

    let swapfile = SwapFile::<PAGE_COUNT, PAGE_SIZE>::open_or_create(&path)?;
    info!("demo: using swap file {} ({} records)", path, swapfile.records());

    let mut mmu = DemoMmu::new(swapfile);

    mmu.set_observer(|event: &PagingEvent| {
        if let PagingEvent::Eviction { victim, written_back: true, .. } = event {
            println!("demo: page {victim:#06X} written back to swap");
        }
    });

    println!("read  0xCAFE = {:#04X}", mmu.read(0xCAFE)?);
    mmu.write(0xCAFE, 0xD)?;
    println!("read  0xBEEF = {:#04X}", mmu.read(0xBEEF)?);
    mmu.write(0xBEEF, 0x2)?;
    println!("read  0xDEAD = {:#04X}", mmu.read(0xDEAD)?);
    mmu.write(0xDEAD, 0x3)?;

    println!("read  0xCAFE = {:#04X}", mmu.read(0xCAFE)?);
    println!("page 0xCA head: {}", dump_page(&mut mmu, 0xCA)?);

    let flushed = mmu.flush()?;
    mmu.check_invariants()?;

    println!("flushed {flushed} dirty pages");
    println!("{:#?}", mmu.stats());

    Ok(())
}
