use powchain_chain::{Blockchain, ChainConfig, ChainError, ConfigError, Submission};
use powchain_core::{
    merkle::hash_node, merkle_root, Amount, Block, BlockState, Hash, Keypair, Miner,
    NonceStrategy, PublicKey, Transaction,
};
use std::sync::atomic::AtomicBool;

fn transfer(amount: &str, sender: PublicKey, recipient: PublicKey) -> Transaction {
    Transaction::transfer(amount.parse().unwrap(), sender, recipient)
}

fn config(capacity: usize, difficulty: u32) -> ChainConfig {
    ChainConfig::new(
        capacity,
        difficulty,
        Keypair::generate().public_key,
        Amount::from_units(50).unwrap(),
    )
}

#[test]
fn test_two_transaction_batch_end_to_end() {
    let mut chain = Blockchain::new(config(2, 1)).unwrap();
    let alice = Keypair::generate().public_key;
    let bob = Keypair::generate().public_key;

    let a = transfer("1.5", alice, bob);
    let b = transfer("0.25", bob, alice);

    assert_eq!(
        chain.submit_transaction(a.clone()).unwrap(),
        Submission::Accepted { pending: 1 }
    );
    assert!(matches!(
        chain.submit_transaction(b.clone()).unwrap(),
        Submission::Sealed(_)
    ));

    assert_eq!(chain.sealed_blocks().len(), 2);
    let genesis = &chain.sealed_blocks()[0];
    let block = &chain.sealed_blocks()[1];

    assert_eq!(block.previous_digest(), genesis.hash().unwrap());
    assert_eq!(block.transactions(), &[a.clone(), b.clone()]);

    let expected_root = hash_node(&a.hash().unwrap(), &b.hash().unwrap());
    assert_eq!(block.merkle_root(), Some(expected_root));
    assert_eq!(
        expected_root,
        merkle_root(&[a.hash().unwrap(), b.hash().unwrap()])
    );

    assert!(block.hash().unwrap().to_hex().starts_with('0'));
    assert!(chain.validate().is_ok());
}

#[test]
fn test_single_transaction_root_pairs_with_itself() {
    let mut chain = Blockchain::new(config(1, 0)).unwrap();
    let tx = transfer("3", Keypair::generate().public_key, Keypair::generate().public_key);
    chain.submit_transaction(tx.clone()).unwrap();

    let leaf = tx.hash().unwrap();
    assert_eq!(chain.latest_block().merkle_root(), Some(hash_node(&leaf, &leaf)));

    let issuance = &chain.genesis().transactions()[0];
    let genesis_leaf = issuance.hash().unwrap();
    assert_eq!(
        chain.genesis().merkle_root(),
        Some(hash_node(&genesis_leaf, &genesis_leaf))
    );
}

#[test]
fn test_capacity_ten_produces_no_chain() {
    let result = Blockchain::new(config(10, 1));
    assert!(matches!(
        result,
        Err(ChainError::Config(ConfigError::BatchCapacity(_)))
    ));
}

#[test]
fn test_genesis_issuance() {
    let owner = Keypair::generate().public_key;
    let amount: Amount = "50".parse().unwrap();
    let chain = Blockchain::new(ChainConfig::new(4, 1, owner, amount)).unwrap();

    let genesis = chain.genesis();
    assert_eq!(genesis.previous_digest(), Hash::ZERO);
    assert_eq!(genesis.tx_count(), 1);
    let issuance = &genesis.transactions()[0];
    assert!(issuance.is_issuance());
    assert_eq!(issuance.recipient(), &owner);
    assert_eq!(issuance.amount(), amount);
}

#[test]
fn test_zero_difficulty_mines_on_first_attempt() {
    let mut block = Block::new(Hash::ZERO, 2);
    let alice = Keypair::generate().public_key;
    let bob = Keypair::generate().public_key;
    block.accept(transfer("1", alice, bob)).unwrap();
    block.accept(transfer("2", bob, alice)).unwrap();
    block.seal(block.compute_merkle_root().unwrap()).unwrap();

    let solution = Miner::new(0, NonceStrategy::Sequential)
        .mine(&block, &AtomicBool::new(false))
        .unwrap();
    assert_eq!(solution.attempts, 1);
    assert_eq!(solution.nonce, block.nonce());
    assert_eq!(solution.digest, block.digest().unwrap());
}

#[test]
fn test_sequential_mining_is_reproducible_across_chains() {
    let mut block = Block::with_timestamp(Hash::from_bytes([4u8; 32]), 2, 1_700_000_000);
    block
        .accept(transfer("1", PublicKey::from_bytes([1; 32]), PublicKey::from_bytes([2; 32])))
        .unwrap();
    block
        .accept(transfer("2", PublicKey::from_bytes([2; 32]), PublicKey::from_bytes([1; 32])))
        .unwrap();
    block.seal(block.compute_merkle_root().unwrap()).unwrap();

    let miner = Miner::new(1, NonceStrategy::Sequential);
    let runs: Vec<_> = (0..3)
        .map(|_| miner.mine(&block, &AtomicBool::new(false)).unwrap())
        .collect();

    assert!(runs.windows(2).all(|w| w[0] == w[1]));
    assert!(runs[0].digest.to_hex().starts_with('0'));
}

#[test]
fn test_many_blocks_stay_linked() {
    let mut chain = Blockchain::new(config(4, 1)).unwrap();
    let keys: Vec<_> = (0..4).map(|_| Keypair::generate().public_key).collect();

    for i in 0..16 {
        let tx = transfer("0.1", keys[i % 4], keys[(i + 1) % 4]);
        chain.submit_transaction(tx).unwrap();
    }

    assert_eq!(chain.height(), 4);
    assert_eq!(chain.state(), BlockState::Open);
    for pair in chain.sealed_blocks().windows(2) {
        assert_eq!(pair[1].previous_digest(), pair[0].hash().unwrap());
    }
    assert!(chain.validate().is_ok());
}
