use clap::Parser;
use log::{info, warn};
use server::games::tictactoe::{Board, Move, BOARD, MOVE};
use shared::{decode, decode_expecting, encode, Envelope, GameMode, GamePayload, JoinType, Message, MessageKind};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;

#[derive(Parser, Debug)]
#[command(author, version, about = "Line client for poking at a running game server", long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,
    /// Login name
    #[arg(short, long, default_value = "guest")]
    login: String,
    /// Password
    #[arg(short, long, default_value = "")]
    password: String,
    /// Game type to auto-join
    #[arg(short, long, default_value = "TicTacToe")]
    game: String,
    /// Play against the server's AI
    #[arg(long)]
    single: bool,
}

async fn send(writer: &mut OwnedWriteHalf, message: Message) -> std::io::Result<()> {
    let mut line = encode(&Envelope::new(message));
    line.push('\n');
    writer.write_all(line.as_bytes()).await
}

fn print_board(board: &Board) {
    for row in board.cells.chunks(3) {
        let marks: String = row
            .iter()
            .map(|cell| match cell {
                Some(0) => 'X',
                Some(_) => 'O',
                None => '.',
            })
            .collect();
        println!("  {}", marks);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let stream = TcpStream::connect(&args.server).await?;
    info!("Connected to {}", args.server);

    let (read_half, mut writer) = stream.into_split();
    let mut server_lines = BufReader::new(read_half).lines();
    let mut input_lines = BufReader::new(tokio::io::stdin()).lines();

    send(
        &mut writer,
        Message::Identify {
            login_name: args.login.clone(),
            password: args.password.clone(),
            display_name: args.login.clone(),
            multi_login: true,
        },
    )
    .await?;

    let Some(line) = server_lines.next_line().await? else {
        println!("Server closed the connection");
        return Ok(());
    };
    match decode_expecting(&line, MessageKind::IdentifyResponse).message {
        Message::IdentifyResponse { success: true, username, .. } => {
            println!("Logged in as {}", username.as_deref().unwrap_or("?"));
        }
        Message::IdentifyResponse { reason, .. } | Message::ForceClose { reason } => {
            println!("Login refused: {}", reason);
            return Ok(());
        }
        other => {
            println!("Unexpected reply: {:?}", other);
            return Ok(());
        }
    }

    let mode = if args.single { GameMode::SinglePlayer } else { GameMode::Multiplayer };
    send(
        &mut writer,
        Message::Join {
            game_type: args.game.clone(),
            mode,
            join_type: JoinType::Auto,
            party_name: None,
            private: false,
        },
    )
    .await?;

    let mut game_id = None;
    println!("Type a cell number (0-8) to move, 'quit' to leave");

    loop {
        tokio::select! {
            line = server_lines.next_line() => {
                let Some(line) = line? else {
                    println!("Server closed the connection");
                    break;
                };
                let message = decode(&line).message;
                match &message {
                    Message::KeepAlive => {
                        send(&mut writer, Message::KeepAlive).await?;
                        continue;
                    }
                    Message::GameStarted { game_id: id, .. } => game_id = Some(*id),
                    Message::GameUpdate { payload, .. } if payload.kind == BOARD => {
                        match payload.unpack::<Board>() {
                            Ok(board) => print_board(&board),
                            Err(e) => warn!("Bad board payload: {}", e),
                        }
                        continue;
                    }
                    Message::GameTerminated { .. } => game_id = None,
                    Message::ForceClose { reason } => {
                        println!("Server closed the session: {}", reason);
                        break;
                    }
                    _ => {}
                }
                println!("<- {:?}", message);
            }
            line = input_lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line == "quit" {
                    send(&mut writer, Message::Goodbye).await?;
                    break;
                }
                match (game_id, line.parse::<u8>()) {
                    (Some(id), Ok(cell)) => {
                        let payload = GamePayload::pack(MOVE, &Move { cell })?;
                        send(&mut writer, Message::GameAction { game_id: id, payload }).await?;
                    }
                    (None, _) => println!("Not in a game yet"),
                    (_, Err(_)) => println!("Enter a cell number from 0 to 8"),
                }
            }
        }
    }

    Ok(())
}
