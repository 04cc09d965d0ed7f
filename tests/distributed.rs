use ezw_wavelet::comm::{Communicator, LocalWorld};
use ezw_wavelet::encode::ezw::{
    DecoderParams, EncoderParams, EncodingKind, EzwDecoder, EzwEncoder, MergeStrategy,
    ParallelEncoderParams, ParallelEzwEncoder,
};
use ezw_wavelet::encode::wavelet::{reassemble, DirectKernel, ParallelTransform, Transform2d};
use ezw_wavelet::utils::matrix::{nrmse, rmse, Matrix};
use std::io::Cursor;

const PROCS: usize = 4;
const ROWS: usize = 32;
const COLS: usize = 64;

fn local_block(rank: usize) -> Matrix<f64> {
    Matrix::from_fn(ROWS, COLS, |i, j| {
        let i = (rank * ROWS + i) as f64;
        let j = j as f64;
        (0.06 + rank as f64) * (5.0 + i + 0.4 * i * i - 0.02 * i * i * j)
    })
}

fn global() -> Matrix<f64> {
    let blocks: Vec<_> = (0..PROCS).map(local_block).collect();
    Matrix::vstack(&blocks).expect("equal block widths")
}

/// Runs the distributed forward transform and returns the gathered result.
fn distributed_forward(level: Option<usize>) -> (usize, Matrix<f64>) {
    let transform = ParallelTransform::default();
    let results = LocalWorld::run(PROCS, |comm| {
        let mut local = local_block(comm.rank());
        let level = transform.forward(&mut local, level, comm)?;
        let gathered = ParallelTransform::gather(&local, comm, 0)?;
        Ok((level, gathered))
    })
    .expect("distributed forward failed");

    let mut results = results.into_iter();
    let (level, gathered) = results.next().unwrap();
    for (_, other) in results {
        assert!(other.is_none(), "only rank 0 gathers");
    }
    (level, gathered.unwrap())
}

#[test]
fn test_forward_matches_sequential() {
    let sequential = Transform2d::new(DirectKernel::default());
    for level in [None, Some(2), Some(1)] {
        let (level, mut gathered) = distributed_forward(level);
        reassemble(&mut gathered, PROCS, level);

        let mut expected = global();
        sequential.forward_2d(&mut expected, Some(level)).unwrap();
        println!("level {}: {}x{}", level, gathered.rows(), gathered.cols());
        assert_eq!(gathered, expected, "level {}", level);
    }
}

#[test]
fn test_inverse_restores_the_data() {
    let transform = ParallelTransform::default();
    let results = LocalWorld::run(PROCS, |comm| {
        let mut local = local_block(comm.rank());
        let level = transform.forward(&mut local, None, comm)?;
        transform.inverse(&mut local, Some(level), comm)?;
        ParallelTransform::gather(&local, comm, 0)
    })
    .unwrap();
    let restored = results[0].as_ref().unwrap();
    let orig = global();

    let err = rmse(&orig, restored).unwrap();
    println!("inverse rmse {}", err);
    assert!(err < 1e-9);

    // and agrees with the sequential inverse of the reassembled coefficients
    let sequential = Transform2d::new(DirectKernel::default());
    let (level, mut coeffs) = distributed_forward(None);
    reassemble(&mut coeffs, PROCS, level);
    sequential.inverse_2d(&mut coeffs, Some(level), None).unwrap();
    assert!(rmse(&coeffs, restored).unwrap() < 1e-9);
}

#[test]
fn test_parallel_ezw_decodes_like_sequential() {
    let (level, mut coeffs) = distributed_forward(None);
    reassemble(&mut coeffs, PROCS, level);
    let base = EncoderParams { scale: 1000, encoding: EncodingKind::Huffman, ..Default::default() };

    let mut sequential_bytes = Vec::new();
    EzwEncoder::new(base.clone())
        .unwrap()
        .encode(&coeffs, &mut sequential_bytes, Some(level))
        .unwrap();
    let expected = EzwDecoder::default()
        .decode(&mut Cursor::new(&sequential_bytes))
        .unwrap()
        .matrix;

    for merge in [MergeStrategy::SequentialOrder, MergeStrategy::RadixBlock] {
        let encoder = ParallelEzwEncoder::new(ParallelEncoderParams { base: base.clone(), merge }).unwrap();
        let transform = ParallelTransform::default();
        let results = LocalWorld::run(PROCS, |comm| {
            let mut local = local_block(comm.rank());
            let level = transform.forward(&mut local, None, comm)?;
            let mut out = Vec::new();
            let header = encoder.encode(&local, &mut out, Some(level), comm)?;
            Ok((header, out))
        })
        .unwrap();

        let root = encoder.root(PROCS);
        let (header, bytes) = &results[root];
        let header = header.as_ref().expect("root writes the header");
        assert_eq!(header.rows, ROWS * PROCS);
        assert_eq!(header.level, level);
        let blocks = if merge == MergeStrategy::RadixBlock { PROCS } else { 1 };
        assert_eq!(header.blocks, blocks);
        println!("{}: {} bytes, {}", merge, bytes.len(), header);

        let decoded = EzwDecoder::default().decode(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(decoded.matrix, expected, "{}", merge);
    }
}

fn parallel_encode(merge: MergeStrategy, scale: u64) -> Vec<u8> {
    let encoder = ParallelEzwEncoder::new(ParallelEncoderParams {
        base: EncoderParams { scale, ..Default::default() },
        merge,
    })
    .unwrap();
    let transform = ParallelTransform::default();
    let mut results = LocalWorld::run(PROCS, |comm| {
        let mut local = local_block(comm.rank());
        let level = transform.forward(&mut local, None, comm)?;
        let mut out = Vec::new();
        encoder.encode(&local, &mut out, Some(level), comm)?;
        Ok(out)
    })
    .unwrap();
    results.swap_remove(encoder.root(PROCS))
}

fn decode(bytes: &[u8], params: DecoderParams) -> Matrix<f64> {
    EzwDecoder::new(params).decode(&mut Cursor::new(bytes)).unwrap().matrix
}

#[test]
fn test_radix_block_progressive_decode() {
    let sequential = parallel_encode(MergeStrategy::SequentialOrder, 100);
    let radix = parallel_encode(MergeStrategy::RadixBlock, 100);
    let full = EzwDecoder::default().decode(&mut Cursor::new(&radix)).unwrap();
    assert_eq!(full.header.blocks, PROCS);
    assert_eq!(full.matrix, decode(&sequential, DecoderParams::default()));

    // every block stops after the same number of passes
    let mut last_err = f64::INFINITY;
    for pass_limit in 1..=full.header.passes {
        let params = DecoderParams { pass_limit, ..Default::default() };
        let by_rank = decode(&sequential, params.clone());
        let by_block = decode(&radix, params);
        assert_eq!(by_block, by_rank, "pass limit {}", pass_limit);

        let err = nrmse(&full.matrix, &by_block).unwrap();
        println!("pass limit {}: nrmse {}", pass_limit, err);
        assert!(err <= last_err, "pass limit {}: {} > {}", pass_limit, err, last_err);
        last_err = err;
    }
    assert_eq!(last_err, 0.0);

    // a byte budget fills the blocks in stream order
    let mut last_err = f64::INFINITY;
    let step = (full.header.ezw_size / 16).max(1);
    for byte_budget in (step..full.header.ezw_size).step_by(step).chain([full.header.ezw_size]) {
        let decoded = decode(&radix, DecoderParams { byte_budget, ..Default::default() });
        let err = nrmse(&full.matrix, &decoded).unwrap();
        assert!(err <= last_err, "budget {}: {} > {}", byte_budget, err, last_err);
        last_err = err;
    }
    assert_eq!(last_err, 0.0);
}
