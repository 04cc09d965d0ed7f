use ezw_wavelet::encode::ezw::{
    DecoderParams, EncoderParams, EncodingKind, EzwDecoder, EzwEncoder, EzwHeader,
};
use ezw_wavelet::encode::wavelet::{Transform2d, TransformKind};
use ezw_wavelet::utils::matrix::{nrmse, rmse, Matrix};
use ezw_wavelet::WaveletError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Write};

fn performance_data(rows: usize, cols: usize, rng: Option<&mut StdRng>) -> Matrix<f64> {
    let mut noise = Matrix::<f64>::new(rows, cols);
    if let Some(rng) = rng {
        noise = Matrix::from_fn(rows, cols, |_, _| rng.r#gen::<f64>());
    }
    Matrix::from_fn(rows, cols, |i, j| {
        let (fi, fj) = (i as f64, j as f64);
        noise[(i, j)] + fi + 0.4 * fi * fi - 0.02 * fi * fi * fj
    })
}

fn encode(mat: &Matrix<f64>, params: EncoderParams, level: Option<usize>) -> (EzwHeader, Vec<u8>) {
    let encoder = EzwEncoder::new(params).expect("valid encoder params");
    let mut out = Vec::new();
    let header = encoder.encode(mat, &mut out, level).expect("encode failed");
    (header, out)
}

fn decode(bytes: &[u8], params: DecoderParams) -> Matrix<f64> {
    EzwDecoder::new(params)
        .decode(&mut Cursor::new(bytes))
        .expect("decode failed")
        .matrix
}

/// Fixed-point coefficients survive encoding exactly when nothing truncates
/// the passes.
#[test]
fn test_fixed_point_coefficients_round_trip_exactly() {
    let mut rng = StdRng::seed_from_u64(7);
    let transform = Transform2d::from_kind(TransformKind::Lifting);

    let mut size = 4;
    while size <= 128 {
        let mut trans = performance_data(size, size, Some(&mut rng));
        let level = transform.forward_2d(&mut trans, None).unwrap();
        let trans = trans.map(|v| (v * 1000.0).trunc());

        let (header, bytes) = encode(&trans, EncoderParams::default(), Some(level));
        assert_eq!(header.level, level);
        assert_eq!(bytes.len(), header.encoded_len() + header.payload_len());

        let decoded = decode(&bytes, DecoderParams::default());
        let err = nrmse(&trans, &decoded).unwrap();
        println!("{}x{}: {} bytes, nrmse {}", size, size, bytes.len(), err);
        assert_eq!(err, 0.0, "size {}", size);
        size <<= 1;
    }
}

#[test]
fn test_end_to_end_small_matrix() {
    let orig = performance_data(8, 8, None);
    let transform = Transform2d::from_kind(TransformKind::Lifting);
    let mut trans = orig.clone();
    assert_eq!(transform.forward_2d(&mut trans, Some(3)).unwrap(), 3);

    // fixed point at 1/1000: the coded coefficients come back bit for bit
    let fixed = trans.map(|v| (v * 1000.0).trunc());
    let (_, bytes) = encode(&fixed, EncoderParams::default(), Some(3));
    let decoded = EzwDecoder::default().decode(&mut Cursor::new(&bytes)).unwrap();
    assert_eq!(decoded.level, 3);
    assert_eq!(nrmse(&fixed, &decoded.matrix).unwrap(), 0.0);

    // scaled the same way by the encoder, the data only loses sub-milli detail
    let params = EncoderParams { scale: 1000, ..Default::default() };
    let (header, bytes) = encode(&trans, params, Some(3));
    assert_eq!(header.scale, 1000);
    let mut decoded = decode(&bytes, DecoderParams::default());
    transform.inverse_2d(&mut decoded, Some(3), None).unwrap();
    let err = rmse(&orig, &decoded).unwrap();
    assert!(err < 5e-3, "rmse {}", err);
}

#[test]
fn test_every_encoding_decodes_the_same() {
    let mut rng = StdRng::seed_from_u64(11);
    let mut trans = performance_data(32, 64, Some(&mut rng));
    let level = Transform2d::default().forward_2d(&mut trans, None).unwrap();

    let mut reference = None;
    for encoding in [EncodingKind::Rle, EncodingKind::Huffman, EncodingKind::Arithmetic] {
        let params = EncoderParams { scale: 100, encoding, ..Default::default() };
        let (header, bytes) = encode(&trans, params, Some(level));
        assert_eq!(header.encoding, encoding);
        println!("{}: {} ({:.2}x)", encoding, bytes.len(), header.compression_ratio());

        let decoded = decode(&bytes, DecoderParams::default());
        match &reference {
            None => reference = Some(decoded),
            Some(r) => assert_eq!(r, &decoded, "{}", encoding),
        }
    }
}

#[test]
fn test_more_passes_never_hurt() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut trans = performance_data(64, 64, Some(&mut rng));
    let level = Transform2d::default().forward_2d(&mut trans, None).unwrap();
    let fixed = trans.map(|v| (v * 100.0).round());

    let (full, _) = encode(&fixed, EncoderParams::default(), Some(level));
    let mut last_err = f64::INFINITY;
    for pass_limit in 1..=full.passes {
        let params = EncoderParams { pass_limit, ..Default::default() };
        let (header, bytes) = encode(&fixed, params, Some(level));
        assert_eq!(header.passes, pass_limit);
        let err = rmse(&fixed, &decode(&bytes, DecoderParams::default())).unwrap();
        assert!(err <= last_err, "pass {}: {} > {}", pass_limit, err, last_err);
        last_err = err;
    }
    assert_eq!(last_err, 0.0);
}

#[test]
fn test_larger_budgets_never_hurt() {
    let mut rng = StdRng::seed_from_u64(5);
    let mut trans = performance_data(32, 32, Some(&mut rng));
    let level = Transform2d::default().forward_2d(&mut trans, None).unwrap();
    let fixed = trans.map(|v| (v * 100.0).round());
    let (full, bytes) = encode(&fixed, EncoderParams::default(), Some(level));

    // progressive decoding of one stream
    let mut last_err = f64::INFINITY;
    for budget in (1..=full.ezw_size).step_by(7).chain([full.ezw_size]) {
        let decoded = decode(&bytes, DecoderParams { byte_budget: budget, ..Default::default() });
        let err = rmse(&fixed, &decoded).unwrap();
        assert!(err <= last_err, "decode budget {}: {} > {}", budget, err, last_err);
        last_err = err;
    }
    assert_eq!(last_err, 0.0);

    // streams cut short by the encoder
    let mut last_err = f64::INFINITY;
    for budget in [8, 32, 64, 128, full.ezw_size] {
        let params = EncoderParams { byte_budget: budget, ..Default::default() };
        let (header, bytes) = encode(&fixed, params, Some(level));
        assert!(header.ezw_size <= budget);
        let err = rmse(&fixed, &decode(&bytes, DecoderParams::default())).unwrap();
        assert!(err <= last_err, "encode budget {}: {} > {}", budget, err, last_err);
        last_err = err;
    }
    assert_eq!(last_err, 0.0);
}

#[test]
fn test_partial_level_decode() {
    let orig = performance_data(32, 32, None);
    let transform = Transform2d::default();
    let mut trans = orig.clone();
    transform.forward_2d(&mut trans, Some(4)).unwrap();
    let (_, bytes) = encode(&trans, EncoderParams { scale: 1000, ..Default::default() }, Some(4));

    let params = DecoderParams { level: Some(2), ..Default::default() };
    let out = EzwDecoder::new(params).decode(&mut Cursor::new(&bytes)).unwrap();
    assert_eq!(out.level, 2);
    assert_eq!((out.matrix.rows(), out.matrix.cols()), (8, 8));
    for i in 0..8 {
        for j in 0..8 {
            assert!((out.matrix[(i, j)] - trans[(i, j)]).abs() <= 1e-3);
        }
    }
}

#[test]
fn test_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("matrix.ezw");
    let mut rng = StdRng::seed_from_u64(99);
    let mut trans = performance_data(16, 128, Some(&mut rng));
    let level = Transform2d::default().forward_2d(&mut trans, None).unwrap();

    let params = EncoderParams {
        scale: 1000,
        encoding: EncodingKind::Arithmetic,
        ..Default::default()
    };
    let written = {
        let mut out = BufWriter::new(File::create(&path).unwrap());
        let header = EzwEncoder::new(params).unwrap().encode(&trans, &mut out, Some(level)).unwrap();
        out.flush().unwrap();
        header
    };
    assert_eq!(
        std::fs::metadata(&path).unwrap().len() as usize,
        written.encoded_len() + written.payload_len()
    );

    let mut input = BufReader::new(File::open(&path).unwrap());
    let out = EzwDecoder::default().decode(&mut input).unwrap();
    assert_eq!(out.header, written);
    assert_eq!(out.bytes_read, written.ezw_size);
    let expected = trans.quantize(1000).map(|v| v as f64 / 1000.0);
    let err = rmse(&expected, &out.matrix).unwrap();
    assert!(err < 1e-9, "rmse {}", err);
}

#[test]
fn test_truncated_streams_are_corrupt() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut trans = performance_data(16, 16, Some(&mut rng));
    Transform2d::default().forward_2d(&mut trans, None).unwrap();

    for encoding in [EncodingKind::Rle, EncodingKind::Huffman, EncodingKind::Arithmetic] {
        let params = EncoderParams { scale: 100, encoding, ..Default::default() };
        let (_, bytes) = encode(&trans, params, None);
        let cut = &bytes[..bytes.len() - 3];
        let err = EzwDecoder::default().decode(&mut Cursor::new(cut)).unwrap_err();
        assert!(matches!(err, WaveletError::Corrupt(_)), "{}: {}", encoding, err);
        assert!(!err.is_recoverable());
    }

    // a random payload behind a valid header
    let (header, bytes) = encode(&trans, EncoderParams::default(), None);
    let mut garbage = bytes[..header.encoded_len()].to_vec();
    garbage.extend((0..header.payload_len()).map(|_| rng.r#gen::<u8>()));
    assert!(EzwDecoder::default().decode(&mut Cursor::new(&garbage)).is_err());
}
